/// Supplies the bearer token attached to every backend call.
pub trait SessionContext: Send + Sync {
    fn access_token(&self) -> Option<String>;
}
