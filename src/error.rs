use thiserror::Error;

use crate::comfy::ComfyError;
use crate::workflow::{ConstraintError, GraphError};

/// Every way a generation run can fail. All of them are fatal: `main`
/// prints the diagnostic and exits with status 1.
#[derive(Debug, Error)]
pub enum GenError {
    #[error("cannot reach the generation server at {url}")]
    Connection { url: String },

    #[error("server rejected the job: {0}")]
    Submission(String),

    #[error("job {job_id} failed: {message}")]
    Execution { job_id: String, message: String },

    #[error("job {job_id} did not finish within {timeout_secs}s")]
    TimedOut { job_id: String, timeout_secs: u64 },

    #[error("no output artifact found: {0}")]
    NotFound(String),

    #[error("invalid parameters: {0}")]
    Validation(#[from] ConstraintError),

    #[error("invalid node graph: {0}")]
    Graph(#[from] GraphError),

    #[error("server API error: {0}")]
    Api(ComfyError),

    #[error("server lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ComfyError> for GenError {
    fn from(err: ComfyError) -> Self {
        match err {
            ComfyError::Unreachable { url, .. } => GenError::Connection { url },
            other => GenError::Api(other),
        }
    }
}

impl GenError {
    /// Converts a failed submission, keeping the server's own diagnostic text.
    pub fn from_submission(err: ComfyError) -> Self {
        match err {
            rejected @ ComfyError::Rejected { .. } => GenError::Submission(rejected.diagnostic()),
            other => other.into(),
        }
    }

    /// A remediation line printed under the error, when one exists.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            GenError::Connection { .. } => Some(
                "Start the server first: cd ~/ComfyUI && python main.py --listen 127.0.0.1 --port 8188",
            ),
            GenError::TimedOut { .. } => {
                Some("The job may still be running; raise --timeout or check the server log.")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_submission_keeps_server_text() {
        let err = GenError::from_submission(ComfyError::Rejected {
            status: 400,
            body: r#"{"error": {"message": "Cannot execute because node Foo does not exist.", "details": ""}, "node_errors": {}}"#.into(),
        });
        assert_eq!(
            err.to_string(),
            "server rejected the job: Cannot execute because node Foo does not exist."
        );
    }

    #[test]
    fn timed_out_display_and_hint() {
        let err = GenError::TimedOut {
            job_id: "abc".into(),
            timeout_secs: 300,
        };
        assert_eq!(err.to_string(), "job abc did not finish within 300s");
        assert!(err.hint().is_some());
    }

    #[test]
    fn connection_error_has_remediation() {
        let err = GenError::Connection {
            url: "http://127.0.0.1:8188".into(),
        };
        assert!(err.hint().unwrap().contains("python main.py"));
    }

    #[test]
    fn decode_errors_stay_api_errors() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: GenError = ComfyError::Decode(json_err).into();
        assert!(matches!(err, GenError::Api(ComfyError::Decode(_))));
    }
}
