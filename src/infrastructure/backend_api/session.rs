use crate::domain::repositories::session::SessionContext;

/// Session backed by a token known up front, e.g. from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    token: Option<String>,
}

impl StaticSession {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|token| !token.trim().is_empty()),
        }
    }
}

impl SessionContext for StaticSession {
    fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}
