//! Error utilities

/// Describes error reason
#[non_exhaustive]
#[derive(Debug, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Unauthorized,
    Forbidden,
    /// Request did not reach API server or response was lost
    Transport,
    /// Catch-all variant. Since this enum is non-exhaustive,
    /// it should be handled with `_` pattern
    Unknown,
}

impl ErrorClass {
    /// Errors of these classes affect every request, not only
    /// the one which failed
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            ErrorClass::Unauthorized | ErrorClass::Forbidden | ErrorClass::Transport
        )
    }
}

/// Tries to classify k8s error
pub fn classify(error_reason: &str) -> ErrorClass {
    match error_reason {
        "NotFound" => ErrorClass::NotFound,
        "Unauthorized" => ErrorClass::Unauthorized,
        "Forbidden" => ErrorClass::Forbidden,
        _ => ErrorClass::Unknown,
    }
}

/// Tries to classify k8s error, wrapped in kube Error
pub fn classify_kube(error: &kube::Error) -> ErrorClass {
    match error {
        kube::Error::Api(api) => match api.code {
            404 => ErrorClass::NotFound,
            401 => ErrorClass::Unauthorized,
            403 => ErrorClass::Forbidden,
            _ => classify(&api.reason),
        },
        kube::Error::HyperError(_) | kube::Error::Service(_) | kube::Error::Auth(_) => {
            ErrorClass::Transport
        }
        _ => ErrorClass::Unknown,
    }
}
