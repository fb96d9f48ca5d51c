//! Typed node schema for the server's prompt format.
//!
//! Each node serializes as `{"class_type": "...", "inputs": {...}}`.
//! References to other nodes serialize as `["<node-id>", <output-index>]`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a node inside one [`JobDescriptor`](super::JobDescriptor).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A reference to output `output` of node `node`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link {
    pub node: NodeId,
    pub output: u32,
}

impl Link {
    pub fn new(node: impl Into<NodeId>, output: u32) -> Self {
        Self {
            node: node.into(),
            output,
        }
    }
}

impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.node, self.output).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Link {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (node, output) = <(NodeId, u32)>::deserialize(deserializer)?;
        Ok(Self { node, output })
    }
}

/// Access to the node references held by a node's inputs.
pub trait NodeInputs {
    fn links(&self) -> Vec<&Link>;
    fn links_mut(&mut self) -> Vec<&mut Link>;
}

macro_rules! no_links {
    ($($ty:ty),* $(,)?) => {
        $(impl NodeInputs for $ty {
            fn links(&self) -> Vec<&Link> {
                Vec::new()
            }
            fn links_mut(&mut self) -> Vec<&mut Link> {
                Vec::new()
            }
        })*
    };
}

macro_rules! links {
    ($ty:ty => $($field:ident),+) => {
        impl NodeInputs for $ty {
            fn links(&self) -> Vec<&Link> {
                vec![$(&self.$field),+]
            }
            fn links_mut(&mut self) -> Vec<&mut Link> {
                vec![$(&mut self.$field),+]
            }
        }
    };
}

// ---- loaders ----

/// Outputs: 0 = MODEL, 1 = CLIP, 2 = VAE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointLoader {
    pub ckpt_name: String,
}

/// Outputs: 0 = VAE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaeLoader {
    pub vae_name: String,
}

/// Outputs: 0 = CLIP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipLoader {
    pub clip_name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Outputs: 0 = MODEL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnetLoader {
    pub unet_name: String,
    pub weight_dtype: String,
}

/// Adapter node. Outputs: 0 = MODEL, 1 = CLIP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraLoader {
    pub lora_name: String,
    pub strength_model: f64,
    pub strength_clip: f64,
    pub model: Link,
    pub clip: Link,
}

// ---- conditioning ----

/// Outputs: 0 = CONDITIONING.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipTextEncode {
    pub text: String,
    pub clip: Link,
}

/// Outputs: 0 = positive, 1 = negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LtxvConditioning {
    pub positive: Link,
    pub negative: Link,
    pub frame_rate: f64,
}

// ---- latents and noise ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmptyLatent {
    pub width: u32,
    pub height: u32,
    pub batch_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmptyLatentVideo {
    pub width: u32,
    pub height: u32,
    pub length: u32,
    pub batch_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomNoise {
    pub noise_seed: u64,
}

// ---- sampling ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSamplingAuraFlow {
    pub shift: f64,
    pub model: Link,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KSampler {
    pub seed: u64,
    pub steps: u32,
    pub cfg: f64,
    pub sampler_name: String,
    pub scheduler: String,
    pub denoise: f64,
    pub model: Link,
    pub positive: Link,
    pub negative: Link,
    pub latent_image: Link,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfgGuider {
    pub cfg: f64,
    pub model: Link,
    pub positive: Link,
    pub negative: Link,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KSamplerSelect {
    pub sampler_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicScheduler {
    pub scheduler: String,
    pub steps: u32,
    pub denoise: f64,
    pub model: Link,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerCustomAdvanced {
    pub noise: Link,
    pub guider: Link,
    pub sampler: Link,
    pub sigmas: Link,
    pub latent_image: Link,
}

// ---- decode and save ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaeDecode {
    pub samples: Link,
    pub vae: Link,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaeDecodeTiled {
    pub tile_size: u32,
    pub overlap: u32,
    pub temporal_size: u32,
    pub temporal_overlap: u32,
    pub samples: Link,
    pub vae: Link,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveImage {
    pub filename_prefix: String,
    pub images: Link,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveAnimatedWebp {
    pub filename_prefix: String,
    pub fps: f64,
    pub lossless: bool,
    pub quality: u32,
    pub method: String,
    pub images: Link,
}

no_links!(
    CheckpointLoader,
    VaeLoader,
    ClipLoader,
    UnetLoader,
    EmptyLatent,
    EmptyLatentVideo,
    RandomNoise,
    KSamplerSelect,
);
links!(LoraLoader => model, clip);
links!(ClipTextEncode => clip);
links!(LtxvConditioning => positive, negative);
links!(ModelSamplingAuraFlow => model);
links!(KSampler => model, positive, negative, latent_image);
links!(CfgGuider => model, positive, negative);
links!(BasicScheduler => model);
links!(SamplerCustomAdvanced => noise, guider, sampler, sigmas, latent_image);
links!(VaeDecode => samples, vae);
links!(VaeDecodeTiled => samples, vae);
links!(SaveImage => images);
links!(SaveAnimatedWebp => images);

/// One node of a job graph, tagged by the server's `class_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_type", content = "inputs")]
pub enum Node {
    #[serde(rename = "CheckpointLoaderSimple")]
    CheckpointLoader(CheckpointLoader),
    #[serde(rename = "VAELoader")]
    VaeLoader(VaeLoader),
    #[serde(rename = "CLIPLoader")]
    ClipLoader(ClipLoader),
    #[serde(rename = "UNETLoader")]
    UnetLoader(UnetLoader),
    #[serde(rename = "LoraLoader")]
    LoraLoader(LoraLoader),
    #[serde(rename = "CLIPTextEncode")]
    ClipTextEncode(ClipTextEncode),
    #[serde(rename = "LTXVConditioning")]
    LtxvConditioning(LtxvConditioning),
    #[serde(rename = "EmptyLatentImage")]
    EmptyLatentImage(EmptyLatent),
    #[serde(rename = "EmptySD3LatentImage")]
    EmptySd3LatentImage(EmptyLatent),
    #[serde(rename = "EmptyLTXVLatentVideo")]
    EmptyLtxvLatentVideo(EmptyLatentVideo),
    #[serde(rename = "RandomNoise")]
    RandomNoise(RandomNoise),
    #[serde(rename = "ModelSamplingAuraFlow")]
    ModelSamplingAuraFlow(ModelSamplingAuraFlow),
    #[serde(rename = "KSampler")]
    KSampler(KSampler),
    #[serde(rename = "CFGGuider")]
    CfgGuider(CfgGuider),
    #[serde(rename = "KSamplerSelect")]
    KSamplerSelect(KSamplerSelect),
    #[serde(rename = "BasicScheduler")]
    BasicScheduler(BasicScheduler),
    #[serde(rename = "SamplerCustomAdvanced")]
    SamplerCustomAdvanced(SamplerCustomAdvanced),
    #[serde(rename = "VAEDecode")]
    VaeDecode(VaeDecode),
    #[serde(rename = "VAEDecodeTiled")]
    VaeDecodeTiled(VaeDecodeTiled),
    #[serde(rename = "SaveImage")]
    SaveImage(SaveImage),
    #[serde(rename = "SaveAnimatedWEBP")]
    SaveAnimatedWebp(SaveAnimatedWebp),
}

impl Node {
    fn inputs(&self) -> &dyn NodeInputs {
        match self {
            Node::CheckpointLoader(i) => i,
            Node::VaeLoader(i) => i,
            Node::ClipLoader(i) => i,
            Node::UnetLoader(i) => i,
            Node::LoraLoader(i) => i,
            Node::ClipTextEncode(i) => i,
            Node::LtxvConditioning(i) => i,
            Node::EmptyLatentImage(i) | Node::EmptySd3LatentImage(i) => i,
            Node::EmptyLtxvLatentVideo(i) => i,
            Node::RandomNoise(i) => i,
            Node::ModelSamplingAuraFlow(i) => i,
            Node::KSampler(i) => i,
            Node::CfgGuider(i) => i,
            Node::KSamplerSelect(i) => i,
            Node::BasicScheduler(i) => i,
            Node::SamplerCustomAdvanced(i) => i,
            Node::VaeDecode(i) => i,
            Node::VaeDecodeTiled(i) => i,
            Node::SaveImage(i) => i,
            Node::SaveAnimatedWebp(i) => i,
        }
    }

    fn inputs_mut(&mut self) -> &mut dyn NodeInputs {
        match self {
            Node::CheckpointLoader(i) => i,
            Node::VaeLoader(i) => i,
            Node::ClipLoader(i) => i,
            Node::UnetLoader(i) => i,
            Node::LoraLoader(i) => i,
            Node::ClipTextEncode(i) => i,
            Node::LtxvConditioning(i) => i,
            Node::EmptyLatentImage(i) | Node::EmptySd3LatentImage(i) => i,
            Node::EmptyLtxvLatentVideo(i) => i,
            Node::RandomNoise(i) => i,
            Node::ModelSamplingAuraFlow(i) => i,
            Node::KSampler(i) => i,
            Node::CfgGuider(i) => i,
            Node::KSamplerSelect(i) => i,
            Node::BasicScheduler(i) => i,
            Node::SamplerCustomAdvanced(i) => i,
            Node::VaeDecode(i) => i,
            Node::VaeDecodeTiled(i) => i,
            Node::SaveImage(i) => i,
            Node::SaveAnimatedWebp(i) => i,
        }
    }

    /// References this node holds to other nodes' outputs.
    pub fn links(&self) -> Vec<&Link> {
        self.inputs().links()
    }

    pub fn links_mut(&mut self) -> Vec<&mut Link> {
        self.inputs_mut().links_mut()
    }

    /// The server-side class name, e.g. `"KSampler"`.
    pub fn class_type(&self) -> &'static str {
        match self {
            Node::CheckpointLoader(_) => "CheckpointLoaderSimple",
            Node::VaeLoader(_) => "VAELoader",
            Node::ClipLoader(_) => "CLIPLoader",
            Node::UnetLoader(_) => "UNETLoader",
            Node::LoraLoader(_) => "LoraLoader",
            Node::ClipTextEncode(_) => "CLIPTextEncode",
            Node::LtxvConditioning(_) => "LTXVConditioning",
            Node::EmptyLatentImage(_) => "EmptyLatentImage",
            Node::EmptySd3LatentImage(_) => "EmptySD3LatentImage",
            Node::EmptyLtxvLatentVideo(_) => "EmptyLTXVLatentVideo",
            Node::RandomNoise(_) => "RandomNoise",
            Node::ModelSamplingAuraFlow(_) => "ModelSamplingAuraFlow",
            Node::KSampler(_) => "KSampler",
            Node::CfgGuider(_) => "CFGGuider",
            Node::KSamplerSelect(_) => "KSamplerSelect",
            Node::BasicScheduler(_) => "BasicScheduler",
            Node::SamplerCustomAdvanced(_) => "SamplerCustomAdvanced",
            Node::VaeDecode(_) => "VAEDecode",
            Node::VaeDecodeTiled(_) => "VAEDecodeTiled",
            Node::SaveImage(_) => "SaveImage",
            Node::SaveAnimatedWebp(_) => "SaveAnimatedWEBP",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_serializes_as_pair() {
        let link = Link::new("4", 2);
        assert_eq!(serde_json::to_string(&link).unwrap(), r#"["4",2]"#);
    }

    #[test]
    fn node_serializes_with_class_type_and_inputs() {
        let node = Node::ClipTextEncode(ClipTextEncode {
            text: "a red fox".into(),
            clip: Link::new("1", 1),
        });
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["class_type"], "CLIPTextEncode");
        assert_eq!(json["inputs"]["text"], "a red fox");
        assert_eq!(json["inputs"]["clip"], serde_json::json!(["1", 1]));
    }

    #[test]
    fn clip_loader_kind_renames_to_type() {
        let node = Node::ClipLoader(ClipLoader {
            clip_name: "qwen.safetensors".into(),
            kind: "qwen_image".into(),
        });
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["inputs"]["type"], "qwen_image");
    }

    #[test]
    fn node_parses_from_server_format() {
        let json = r#"{"class_type": "VAEDecode", "inputs": {"samples": ["5", 0], "vae": ["1", 2]}}"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node.class_type(), "VAEDecode");
        assert_eq!(node.links(), vec![&Link::new("5", 0), &Link::new("1", 2)]);
    }

    #[test]
    fn loaders_have_no_links() {
        let node = Node::CheckpointLoader(CheckpointLoader {
            ckpt_name: "x.safetensors".into(),
        });
        assert!(node.links().is_empty());
    }

    #[test]
    fn links_mut_rewrites_in_place() {
        let mut node = Node::KSampler(KSampler {
            seed: 1,
            steps: 20,
            cfg: 1.0,
            sampler_name: "euler".into(),
            scheduler: "normal".into(),
            denoise: 1.0,
            model: Link::new("1", 0),
            positive: Link::new("2", 0),
            negative: Link::new("3", 0),
            latent_image: Link::new("4", 0),
        });
        for link in node.links_mut() {
            if link.node.as_str() == "1" {
                *link = Link::new("9", 0);
            }
        }
        assert_eq!(node.links()[0], &Link::new("9", 0));
    }
}
