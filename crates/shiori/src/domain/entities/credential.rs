#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Epoch milliseconds after which `access_token` must not be used.
    pub expires_at: Option<i64>,
}

impl Credential {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => expires_at < now_millis,
            _ => true,
        }
    }
}
