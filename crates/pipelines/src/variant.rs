use iris_agent::AgentVariant;

#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseChatVariant {
    pub id: String,
    pub name: String,
    pub description: String,
    pub agent_model: String,
    pub citation_model: String,
}

impl ExerciseChatVariant {
    pub fn all() -> Vec<Self> {
        vec![
            Self {
                id: "default".into(),
                name: "Default".into(),
                description: "Uses a smaller model for faster and cost-efficient responses.".into(),
                agent_model: "gpt-4.1-mini".into(),
                citation_model: "gpt-4.1-mini".into(),
            },
            Self {
                id: "advanced".into(),
                name: "Advanced".into(),
                description: "Uses a larger chat model, balancing speed and quality.".into(),
                agent_model: "gpt-4.1".into(),
                citation_model: "gpt-4.1-mini".into(),
            },
        ]
    }

    pub fn find(id: &str) -> Option<Self> {
        Self::all().into_iter().find(|v| v.id == id)
    }
}

impl AgentVariant for ExerciseChatVariant {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn agent_model(&self) -> &str {
        &self.agent_model
    }

    fn required_models(&self) -> Vec<String> {
        let mut models = vec![self.agent_model.clone()];
        if self.citation_model != self.agent_model {
            models.push(self.citation_model.clone());
        }
        models
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptUserVariant {
    pub id: String,
    pub name: String,
    pub description: String,
    pub agent_model: String,
    /// Model that judges the student's answers.
    pub assessment_model: String,
}

impl PromptUserVariant {
    pub fn all() -> Vec<Self> {
        vec![
            Self {
                id: "default".into(),
                name: "Default".into(),
                description: "Uses a smaller model for faster and cost-efficient responses.".into(),
                agent_model: "gpt-4.1-mini".into(),
                assessment_model: "gpt-4.1-mini".into(),
            },
            Self {
                id: "advanced".into(),
                name: "Advanced".into(),
                description: "Uses a larger chat model, balancing speed and quality.".into(),
                agent_model: "gpt-4.1".into(),
                assessment_model: "gpt-4.1".into(),
            },
        ]
    }

    pub fn find(id: &str) -> Option<Self> {
        Self::all().into_iter().find(|v| v.id == id)
    }
}

impl AgentVariant for PromptUserVariant {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn agent_model(&self) -> &str {
        &self.agent_model
    }

    fn required_models(&self) -> Vec<String> {
        let mut models = vec![self.agent_model.clone()];
        if self.assessment_model != self.agent_model {
            models.push(self.assessment_model.clone());
        }
        models
    }
}
