/// Per-client authentication state
#[derive(Debug, Default)]
pub struct ClientSession {
    pub username: Option<String>,
    pub authenticated: bool,
    pub auth_method: String,
    pub ssh_key_fingerprint: Option<String>,
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the attempt that let the client in.
    pub fn accept(&mut self, username: &str, method: &str) {
        self.authenticated = true;
        self.username = Some(username.to_string());
        self.auth_method = method.to_string();
    }
}
