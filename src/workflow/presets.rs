//! Ready-made job graphs for the supported model families.
//!
//! Every preset wires loader → text encoders → latent/noise → sampler →
//! decoder → saver. Optional adapters are added afterwards with
//! [`JobDescriptor::splice_adapter`] instead of branching inside the graph.

use std::time::Duration;

use serde::Serialize;

use super::graph::{GraphError, JobDescriptor};
use super::nodes::*;

/// Lightning adapter for Qwen-Image (4-step distillation).
pub const QWEN_LIGHTNING_LORA: &str = "Qwen-Image-Lightning-4steps-V1.0.safetensors";

/// High-level knobs a caller sets for one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    /// Frame count; ignored by image presets.
    pub frames: u32,
    /// Frame rate; ignored by image presets.
    pub fps: f64,
    pub steps: u32,
    pub seed: u64,
    pub checkpoint: String,
    pub adapter: Option<Adapter>,
}

/// A LoRA spliced between the base loaders and their consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct Adapter {
    pub name: String,
    pub strength: f64,
}

impl Adapter {
    /// Parses `name` or `name:strength`.
    pub fn parse(spec: &str) -> Option<Self> {
        match spec.rsplit_once(':') {
            Some((name, strength)) if !name.is_empty() => {
                let strength = strength.parse().ok()?;
                Some(Self {
                    name: name.to_string(),
                    strength,
                })
            }
            Some(_) => None,
            None if spec.is_empty() => None,
            None => Some(Self {
                name: spec.to_string(),
                strength: 1.0,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    FluxImage,
    QwenImage,
    LtxVideo,
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Preset::FluxImage => write!(f, "flux-image"),
            Preset::QwenImage => write!(f, "qwen-image"),
            Preset::LtxVideo => write!(f, "ltx-video"),
        }
    }
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::FluxImage, Preset::QwenImage, Preset::LtxVideo];

    pub fn default_checkpoint(&self) -> &'static str {
        match self {
            Preset::FluxImage => "flux1-dev-fp8.safetensors",
            Preset::QwenImage => "qwen_image_2512_fp8_e4m3fn.safetensors",
            Preset::LtxVideo => "ltx-2-19b-dev-fp8.safetensors",
        }
    }

    /// Server model folder the checkpoint is loaded from.
    pub fn model_folder(&self) -> &'static str {
        match self {
            Preset::FluxImage | Preset::LtxVideo => "checkpoints",
            Preset::QwenImage => "diffusion_models",
        }
    }

    /// `filename_prefix` given to the saver node; may contain a subfolder.
    pub fn filename_prefix(&self) -> &'static str {
        match self {
            Preset::FluxImage => "api_output",
            Preset::QwenImage => "qwen_image",
            Preset::LtxVideo => "LTX-2/API",
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Preset::FluxImage | Preset::QwenImage => &["png"],
            Preset::LtxVideo => &["webp"],
        }
    }

    /// Width and height must be multiples of this.
    pub fn dimension_multiple(&self) -> u32 {
        match self {
            Preset::FluxImage => 8,
            Preset::QwenImage => 16,
            Preset::LtxVideo => 32,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        match self {
            Preset::FluxImage => Duration::from_secs(300),
            Preset::QwenImage => Duration::from_secs(600),
            Preset::LtxVideo => Duration::from_secs(1200),
        }
    }

    pub fn default_poll_interval(&self) -> Duration {
        match self {
            Preset::FluxImage | Preset::QwenImage => Duration::from_secs(2),
            Preset::LtxVideo => Duration::from_secs(1),
        }
    }

    /// The MODEL and CLIP outputs an adapter sits in front of.
    fn adapter_base(&self) -> (Link, Link) {
        match self {
            Preset::FluxImage | Preset::LtxVideo => (Link::new("1", 0), Link::new("1", 1)),
            Preset::QwenImage => (Link::new("3", 0), Link::new("2", 0)),
        }
    }

    /// Node types the server needs to run this preset, adapter loader
    /// included, in graph order.
    pub fn class_types(&self) -> Result<Vec<&'static str>, GraphError> {
        let sample = GenerationParams {
            prompt: "sample".into(),
            negative_prompt: String::new(),
            width: 1024,
            height: 1024,
            frames: 25,
            fps: 25.0,
            steps: 1,
            seed: 0,
            checkpoint: self.default_checkpoint().into(),
            adapter: Some(Adapter {
                name: "adapter.safetensors".into(),
                strength: 1.0,
            }),
        };
        let mut types = Vec::new();
        for (_, node) in self.build(&sample)?.iter() {
            if !types.contains(&node.class_type()) {
                types.push(node.class_type());
            }
        }
        Ok(types)
    }

    /// Builds and validates the job graph for `params`.
    ///
    /// Dimension and frame-count rules are not checked here; see
    /// [`super::constraints`].
    pub fn build(&self, params: &GenerationParams) -> Result<JobDescriptor, GraphError> {
        let mut graph = match self {
            Preset::FluxImage => flux_image(params)?,
            Preset::QwenImage => qwen_image(params)?,
            Preset::LtxVideo => ltx_video(params)?,
        };

        if let Some(adapter) = &params.adapter {
            let (model, clip) = self.adapter_base();
            let lora = Node::LoraLoader(LoraLoader {
                lora_name: adapter.name.clone(),
                strength_model: adapter.strength,
                strength_clip: adapter.strength,
                model: model.clone(),
                clip: clip.clone(),
            });
            let id = graph.next_id();
            graph.splice_adapter(id, lora, &[(model, 0), (clip, 1)])?;
        }

        graph.validate()?;
        Ok(graph)
    }
}

fn flux_image(p: &GenerationParams) -> Result<JobDescriptor, GraphError> {
    let mut g = JobDescriptor::new();
    g.insert(
        "1",
        Node::CheckpointLoader(CheckpointLoader {
            ckpt_name: p.checkpoint.clone(),
        }),
    )?;
    g.insert(
        "2",
        Node::ClipTextEncode(ClipTextEncode {
            text: p.prompt.clone(),
            clip: Link::new("1", 1),
        }),
    )?;
    g.insert(
        "3",
        Node::ClipTextEncode(ClipTextEncode {
            text: p.negative_prompt.clone(),
            clip: Link::new("1", 1),
        }),
    )?;
    g.insert(
        "4",
        Node::EmptyLatentImage(EmptyLatent {
            width: p.width,
            height: p.height,
            batch_size: 1,
        }),
    )?;
    g.insert(
        "5",
        Node::KSampler(KSampler {
            seed: p.seed,
            steps: p.steps,
            cfg: 1.0,
            sampler_name: "euler".into(),
            scheduler: "normal".into(),
            denoise: 1.0,
            model: Link::new("1", 0),
            positive: Link::new("2", 0),
            negative: Link::new("3", 0),
            latent_image: Link::new("4", 0),
        }),
    )?;
    g.insert(
        "6",
        Node::VaeDecode(VaeDecode {
            samples: Link::new("5", 0),
            vae: Link::new("1", 2),
        }),
    )?;
    g.insert(
        "7",
        Node::SaveImage(SaveImage {
            filename_prefix: Preset::FluxImage.filename_prefix().into(),
            images: Link::new("6", 0),
        }),
    )?;
    Ok(g)
}

fn qwen_image(p: &GenerationParams) -> Result<JobDescriptor, GraphError> {
    let mut g = JobDescriptor::new();
    g.insert(
        "1",
        Node::VaeLoader(VaeLoader {
            vae_name: "qwen_image_vae.safetensors".into(),
        }),
    )?;
    g.insert(
        "2",
        Node::ClipLoader(ClipLoader {
            clip_name: "qwen_2.5_vl_7b_fp8_scaled.safetensors".into(),
            kind: "qwen_image".into(),
        }),
    )?;
    g.insert(
        "3",
        Node::UnetLoader(UnetLoader {
            unet_name: p.checkpoint.clone(),
            weight_dtype: "fp8_e4m3fn".into(),
        }),
    )?;
    g.insert(
        "4",
        Node::ClipTextEncode(ClipTextEncode {
            text: p.prompt.clone(),
            clip: Link::new("2", 0),
        }),
    )?;
    g.insert(
        "5",
        Node::ClipTextEncode(ClipTextEncode {
            text: p.negative_prompt.clone(),
            clip: Link::new("2", 0),
        }),
    )?;
    g.insert(
        "6",
        Node::EmptySd3LatentImage(EmptyLatent {
            width: p.width,
            height: p.height,
            batch_size: 1,
        }),
    )?;
    g.insert(
        "7",
        Node::ModelSamplingAuraFlow(ModelSamplingAuraFlow {
            shift: 1.73,
            model: Link::new("3", 0),
        }),
    )?;
    g.insert(
        "8",
        Node::KSampler(KSampler {
            seed: p.seed,
            steps: p.steps,
            cfg: 4.5,
            sampler_name: "euler".into(),
            scheduler: "normal".into(),
            denoise: 1.0,
            model: Link::new("7", 0),
            positive: Link::new("4", 0),
            negative: Link::new("5", 0),
            latent_image: Link::new("6", 0),
        }),
    )?;
    g.insert(
        "9",
        Node::VaeDecode(VaeDecode {
            samples: Link::new("8", 0),
            vae: Link::new("1", 0),
        }),
    )?;
    g.insert(
        "10",
        Node::SaveImage(SaveImage {
            filename_prefix: Preset::QwenImage.filename_prefix().into(),
            images: Link::new("9", 0),
        }),
    )?;
    Ok(g)
}

fn ltx_video(p: &GenerationParams) -> Result<JobDescriptor, GraphError> {
    let mut g = JobDescriptor::new();
    g.insert(
        "1",
        Node::CheckpointLoader(CheckpointLoader {
            ckpt_name: p.checkpoint.clone(),
        }),
    )?;
    g.insert(
        "2",
        Node::ClipTextEncode(ClipTextEncode {
            text: p.prompt.clone(),
            clip: Link::new("1", 1),
        }),
    )?;
    g.insert(
        "3",
        Node::ClipTextEncode(ClipTextEncode {
            text: p.negative_prompt.clone(),
            clip: Link::new("1", 1),
        }),
    )?;
    g.insert(
        "4",
        Node::EmptyLtxvLatentVideo(EmptyLatentVideo {
            width: p.width,
            height: p.height,
            length: p.frames,
            batch_size: 1,
        }),
    )?;
    g.insert("5", Node::RandomNoise(RandomNoise { noise_seed: p.seed }))?;
    g.insert(
        "6",
        Node::LtxvConditioning(LtxvConditioning {
            positive: Link::new("2", 0),
            negative: Link::new("3", 0),
            frame_rate: p.fps,
        }),
    )?;
    g.insert(
        "7",
        Node::CfgGuider(CfgGuider {
            cfg: 1.0,
            model: Link::new("1", 0),
            positive: Link::new("6", 0),
            negative: Link::new("6", 1),
        }),
    )?;
    g.insert(
        "8",
        Node::KSamplerSelect(KSamplerSelect {
            sampler_name: "euler_ancestral".into(),
        }),
    )?;
    g.insert(
        "9",
        Node::BasicScheduler(BasicScheduler {
            scheduler: "normal".into(),
            steps: p.steps,
            denoise: 1.0,
            model: Link::new("1", 0),
        }),
    )?;
    g.insert(
        "10",
        Node::SamplerCustomAdvanced(SamplerCustomAdvanced {
            noise: Link::new("5", 0),
            guider: Link::new("7", 0),
            sampler: Link::new("8", 0),
            sigmas: Link::new("9", 0),
            latent_image: Link::new("4", 0),
        }),
    )?;
    g.insert(
        "11",
        Node::VaeDecodeTiled(VaeDecodeTiled {
            tile_size: 512,
            overlap: 64,
            temporal_size: 64,
            temporal_overlap: 8,
            samples: Link::new("10", 0),
            vae: Link::new("1", 2),
        }),
    )?;
    g.insert(
        "12",
        Node::SaveAnimatedWebp(SaveAnimatedWebp {
            filename_prefix: Preset::LtxVideo.filename_prefix().into(),
            fps: p.fps,
            lossless: false,
            quality: 90,
            method: "default".into(),
            images: Link::new("11", 0),
        }),
    )?;
    Ok(g)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(preset: Preset) -> GenerationParams {
        GenerationParams {
            prompt: "a lighthouse at dusk".into(),
            negative_prompt: "blurry".into(),
            width: 1024,
            height: 1024,
            frames: 25,
            fps: 25.0,
            steps: 20,
            seed: 42,
            checkpoint: preset.default_checkpoint().into(),
            adapter: None,
        }
    }

    fn all_presets() -> [Preset; 3] {
        Preset::ALL
    }

    #[test]
    fn class_types_cover_custom_nodes_and_adapter() {
        let ltx = Preset::LtxVideo.class_types().unwrap();
        assert!(ltx.contains(&"EmptyLTXVLatentVideo"));
        assert!(ltx.contains(&"SaveAnimatedWEBP"));
        assert!(ltx.contains(&"LoraLoader"));
        let qwen = Preset::QwenImage.class_types().unwrap();
        assert!(qwen.contains(&"ModelSamplingAuraFlow"));
        assert_eq!(
            qwen.iter().filter(|t| **t == "CLIPTextEncode").count(),
            1
        );
    }

    #[test]
    fn qwen_loads_from_diffusion_models() {
        assert_eq!(Preset::QwenImage.model_folder(), "diffusion_models");
        assert_eq!(Preset::FluxImage.model_folder(), "checkpoints");
    }

    #[test]
    fn every_preset_is_referentially_closed() {
        for preset in all_presets() {
            for adapter in [
                None,
                Some(Adapter {
                    name: "style.safetensors".into(),
                    strength: 0.8,
                }),
            ] {
                let mut p = params(preset);
                p.adapter = adapter;
                let graph = preset.build(&p).unwrap();
                for (id, node) in graph.iter() {
                    for link in node.links() {
                        assert!(
                            graph.contains(&link.node),
                            "{preset}: node {id} references missing {}",
                            link.node
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn pipelines_end_in_a_saver() {
        for preset in all_presets() {
            let graph = preset.build(&params(preset)).unwrap();
            let order = graph.topological_order().unwrap();
            let last = graph.get(order.last().unwrap()).unwrap();
            assert!(
                matches!(last, Node::SaveImage(_) | Node::SaveAnimatedWebp(_)),
                "{preset} ends with {}",
                last.class_type()
            );
        }
    }

    #[test]
    fn flux_graph_carries_parameters() {
        let graph = Preset::FluxImage.build(&params(Preset::FluxImage)).unwrap();
        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(json["1"]["inputs"]["ckpt_name"], "flux1-dev-fp8.safetensors");
        assert_eq!(json["2"]["inputs"]["text"], "a lighthouse at dusk");
        assert_eq!(json["3"]["inputs"]["text"], "blurry");
        assert_eq!(json["4"]["inputs"]["width"], 1024);
        assert_eq!(json["5"]["inputs"]["seed"], 42);
        assert_eq!(json["7"]["inputs"]["filename_prefix"], "api_output");
    }

    #[test]
    fn ltx_graph_uses_frame_count_and_rate() {
        let mut p = params(Preset::LtxVideo);
        p.width = 704;
        p.height = 384;
        p.frames = 97;
        p.fps = 24.0;
        let json = serde_json::to_value(Preset::LtxVideo.build(&p).unwrap()).unwrap();
        assert_eq!(json["4"]["class_type"], "EmptyLTXVLatentVideo");
        assert_eq!(json["4"]["inputs"]["length"], 97);
        assert_eq!(json["6"]["inputs"]["frame_rate"], 24.0);
        assert_eq!(json["12"]["inputs"]["fps"], 24.0);
        assert_eq!(json["12"]["inputs"]["filename_prefix"], "LTX-2/API");
    }

    #[test]
    fn qwen_lightning_rewires_model_and_clip_consumers() {
        let mut p = params(Preset::QwenImage);
        p.adapter = Some(Adapter {
            name: QWEN_LIGHTNING_LORA.into(),
            strength: 1.0,
        });
        let base = Preset::QwenImage
            .build(&params(Preset::QwenImage))
            .unwrap();
        let graph = Preset::QwenImage.build(&p).unwrap();
        let json = serde_json::to_value(&graph).unwrap();

        assert_eq!(json["11"]["class_type"], "LoraLoader");
        assert_eq!(json["11"]["inputs"]["model"], serde_json::json!(["3", 0]));
        assert_eq!(json["11"]["inputs"]["clip"], serde_json::json!(["2", 0]));
        assert_eq!(json["7"]["inputs"]["model"], serde_json::json!(["11", 0]));
        assert_eq!(json["4"]["inputs"]["clip"], serde_json::json!(["11", 1]));
        assert_eq!(json["5"]["inputs"]["clip"], serde_json::json!(["11", 1]));

        // Nodes that never read the model or clip outputs are unchanged.
        for id in ["1", "2", "3", "6", "8", "9", "10"] {
            let id = NodeId::from(id);
            assert_eq!(graph.get(&id), base.get(&id), "node {id} changed");
        }
    }

    #[test]
    fn adapter_parse_variants() {
        assert_eq!(
            Adapter::parse("detail.safetensors"),
            Some(Adapter {
                name: "detail.safetensors".into(),
                strength: 1.0
            })
        );
        assert_eq!(
            Adapter::parse("detail.safetensors:0.6"),
            Some(Adapter {
                name: "detail.safetensors".into(),
                strength: 0.6
            })
        );
        assert_eq!(Adapter::parse("detail:abc"), None);
        assert_eq!(Adapter::parse(""), None);
        assert_eq!(Adapter::parse(":0.5"), None);
    }
}
