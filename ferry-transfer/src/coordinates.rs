use std::fmt;

/// Per-call login for the bulk store.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything one bulk transfer session needs.
///
/// `directory` is the attachment's unique id, so concurrent uploads of
/// different attachments never collide on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinates {
    /// `host[:port]` of the bulk store.
    pub address: String,
    pub directory: String,
    pub file_name: String,
    pub credentials: Credentials,
}

impl Coordinates {
    /// Remote path of the payload, `<directory>/<file_name>`.
    #[must_use]
    pub fn path(&self) -> String {
        if self.directory.is_empty() {
            self.file_name.clone()
        } else {
            format!("{}/{}", self.directory, self.file_name)
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_hides_password() {
        let coordinates = Coordinates {
            address: "bulk.local:2121".to_string(),
            directory: "0b9c".to_string(),
            file_name: "scan.pdf".to_string(),
            credentials: Credentials::new("anonymous", "hunter2"),
        };

        assert_eq!(coordinates.to_string(), "bulk.local:2121/0b9c/scan.pdf");
        assert!(!format!("{coordinates:?}").contains("hunter2"));
    }

    #[test]
    fn test_path_without_directory() {
        let coordinates = Coordinates {
            address: "bulk.local".to_string(),
            directory: String::new(),
            file_name: "scan.pdf".to_string(),
            credentials: Credentials::default(),
        };

        assert_eq!(coordinates.path(), "scan.pdf");
    }
}
