use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::tracker::JobStatus;

/// Body of a successful `POST /prompt`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub prompt_id: String,
    #[serde(default)]
    pub number: u64,
    /// Non-fatal per-node warnings; the server includes this even on success.
    #[serde(default)]
    pub node_errors: serde_json::Value,
}

/// Identity of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub id: String,
    pub client_id: String,
    pub queue_number: u64,
}

/// A file the server recorded as a node output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputReference {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Folder kind: `output`, `temp` or `input`.
    #[serde(rename = "type", default = "default_folder")]
    pub kind: String,
}

fn default_folder() -> String {
    "output".to_string()
}

/// Recorded outputs of a job, keyed by node id in the order the server lists them.
///
/// Every list field of a node output whose entries carry a `filename`
/// (`images`, `gifs`, `videos`, ...) contributes references; other fields
/// such as `text` are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Outputs {
    pub nodes: Vec<(String, Vec<OutputReference>)>,
}

impl Outputs {
    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(|(_, refs)| refs.is_empty())
    }

    pub fn references(&self) -> impl Iterator<Item = &OutputReference> {
        self.nodes.iter().flat_map(|(_, refs)| refs.iter())
    }
}

impl<'de> Deserialize<'de> for Outputs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OutputsVisitor;

        impl<'de> Visitor<'de> for OutputsVisitor {
            type Value = Outputs;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map of node id to node output")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Outputs, A::Error> {
                let mut nodes = Vec::new();
                while let Some((node, output)) =
                    map.next_entry::<String, serde_json::Map<String, serde_json::Value>>()?
                {
                    let refs = output
                        .into_iter()
                        .filter_map(|(_, field)| match field {
                            serde_json::Value::Array(items) => Some(items),
                            _ => None,
                        })
                        .flatten()
                        .filter(|item| item.get("filename").is_some())
                        .filter_map(|item| serde_json::from_value(item).ok())
                        .collect();
                    nodes.push((node, refs));
                }
                Ok(Outputs { nodes })
            }
        }

        deserializer.deserialize_map(OutputsVisitor)
    }
}

/// One entry of `GET /history/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub status: Option<HistoryStatus>,
    #[serde(default)]
    pub outputs: Outputs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: bool,
    /// `[tag, payload]` pairs, e.g. `["execution_error", {...}]`.
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
}

impl HistoryStatus {
    /// `exception_message` of the first message whose tag mentions an error.
    pub fn error_message(&self) -> Option<String> {
        self.messages.iter().find_map(|m| {
            let pair = m.as_array()?;
            let tag = pair.first()?.as_str()?;
            if !tag.contains("error") {
                return None;
            }
            let payload = pair.get(1)?;
            Some(
                payload
                    .get("exception_message")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| payload.to_string()),
            )
        })
    }
}

impl HistoryEntry {
    /// Maps the recorded state to a [`JobStatus`].
    ///
    /// An entry exists only once the server has started the job, so
    /// anything without a terminal marker counts as executing.
    pub fn job_status(&self) -> JobStatus {
        let Some(status) = &self.status else {
            return if self.outputs.is_empty() {
                JobStatus::Executing { node: None }
            } else {
                JobStatus::Succeeded(self.outputs.clone())
            };
        };

        match status.status_str.as_deref() {
            Some("success") => JobStatus::Succeeded(self.outputs.clone()),
            Some("error") => JobStatus::Failed(
                status
                    .error_message()
                    .unwrap_or_else(|| "execution failed".to_string()),
            ),
            _ if status.completed => JobStatus::Succeeded(self.outputs.clone()),
            _ => JobStatus::Executing { node: None },
        }
    }
}

/// Subset of `GET /system_stats` shown by `localgen check`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemStats {
    #[serde(default)]
    pub system: SystemInfo,
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemInfo {
    pub os: Option<String>,
    pub comfyui_version: Option<String>,
    pub python_version: Option<String>,
    pub pytorch_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub vram_total: Option<u64>,
    pub vram_free: Option<u64>,
}
