//! In-process BLIP image captioning on candle.

use async_trait::async_trait;
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::blip;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::{CaptionPipeline, LoadEvent, LocalCaptioner, ModelFetcher, ProgressCallback};
use crate::error::{Error, FailureKind, Result};

const MODEL_FILES: [&str; 3] = ["config.json", "tokenizer.json", "model.safetensors"];
const IMAGE_SIZE: u32 = 384;
const BOS_TOKEN_ID: u32 = 30522;
const SEP_TOKEN_ID: u32 = 102;
const MAX_CAPTION_TOKENS: usize = 64;
const SAMPLING_SEED: u64 = 1337;

/// Loads BLIP captioning checkpoints from the hub cache.
pub struct BlipCaptioner {
    fetcher: ModelFetcher,
    device: Device,
}

impl BlipCaptioner {
    pub fn new(fetcher: ModelFetcher) -> Self {
        Self {
            fetcher,
            device: Device::Cpu,
        }
    }
}

#[async_trait]
impl LocalCaptioner for BlipCaptioner {
    fn is_available(&self) -> bool {
        true
    }

    async fn load(
        &self,
        model_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<Arc<dyn CaptionPipeline>> {
        let model_dir = self.fetcher.fetch(model_id, &MODEL_FILES, &on_progress).await?;

        on_progress(LoadEvent::loading());
        info!("Loading BLIP weights from {:?}", model_dir);

        let device = self.device.clone();
        let pipeline = tokio::task::spawn_blocking(move || BlipPipeline::load(&model_dir, device))
            .await
            .map_err(|e| Error::ModelLoad(format!("BLIP load task failed: {}", e)))??;

        on_progress(LoadEvent::ready());
        Ok(Arc::new(pipeline))
    }
}

struct BlipInner {
    model: Mutex<blip::BlipForConditionalGeneration>,
    tokenizer: Tokenizer,
    device: Device,
}

/// A loaded BLIP model plus tokenizer.
pub struct BlipPipeline {
    inner: Arc<BlipInner>,
}

impl BlipPipeline {
    fn load(model_dir: &Path, device: Device) -> Result<Self> {
        let config = blip::Config::image_captioning_large();
        let weights = model_dir.join("model.safetensors");
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)
                .map_err(|e| Error::ModelLoad(format!("Failed to load safetensors: {}", e)))?
        };
        let model = blip::BlipForConditionalGeneration::new(&config, vb)
            .map_err(|e| Error::ModelLoad(format!("Failed to build BLIP model: {}", e)))?;
        let tokenizer = Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| Error::ModelLoad(format!("Failed to load tokenizer: {}", e)))?;

        Ok(Self {
            inner: Arc::new(BlipInner {
                model: Mutex::new(model),
                tokenizer,
                device,
            }),
        })
    }
}

#[async_trait]
impl CaptionPipeline for BlipPipeline {
    async fn caption(&self, image: &[u8]) -> Result<String> {
        let inner = self.inner.clone();
        let image = image.to_vec();
        tokio::task::spawn_blocking(move || inner.generate(&image))
            .await
            .map_err(|e| inference_error(format!("BLIP caption task failed: {}", e)))?
    }
}

impl BlipInner {
    fn generate(&self, image: &[u8]) -> Result<String> {
        let pixels = preprocess(image, &self.device)?;
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        model.reset_kv_cache();

        let image_embeds = pixels
            .unsqueeze(0)
            .and_then(|batch| model.vision_model().forward(&batch))
            .map_err(candle_error)?;

        let mut logits_processor = LogitsProcessor::new(SAMPLING_SEED, None, None);
        let mut token_ids = vec![BOS_TOKEN_ID];
        for index in 0..MAX_CAPTION_TOKENS {
            let context_size = if index > 0 { 1 } else { token_ids.len() };
            let start = token_ids.len().saturating_sub(context_size);
            let input_ids = Tensor::new(&token_ids[start..], &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(candle_error)?;
            let logits = model
                .text_decoder()
                .forward(&input_ids, &image_embeds)
                .and_then(|l| l.squeeze(0))
                .and_then(|l| {
                    let last = l.dim(0)? - 1;
                    l.get(last)
                })
                .map_err(candle_error)?;
            let token = logits_processor.sample(&logits).map_err(candle_error)?;
            if token == SEP_TOKEN_ID {
                break;
            }
            token_ids.push(token);
        }
        model.reset_kv_cache();

        let text = self
            .tokenizer
            .decode(&token_ids[1..], true)
            .map_err(|e| inference_error(format!("Failed to decode caption: {}", e)))?;
        debug!("BLIP produced {} tokens", token_ids.len() - 1);
        Ok(text.trim().to_string())
    }
}

/// Decode, resize to the BLIP input size and normalize with CLIP statistics.
fn preprocess(image: &[u8], device: &Device) -> Result<Tensor> {
    let img = image::load_from_memory(image)
        .map_err(|e| Error::InvalidInput(format!("Unsupported image: {}", e)))?
        .resize_to_fill(IMAGE_SIZE, IMAGE_SIZE, image::imageops::FilterType::Triangle)
        .to_rgb8();
    let side = IMAGE_SIZE as usize;

    let tensor = Tensor::from_vec(img.into_raw(), (side, side, 3), device)
        .and_then(|t| t.permute((2, 0, 1)))
        .and_then(|t| t.to_dtype(DType::F32))
        .and_then(|t| t / 255.0)
        .and_then(|t| {
            let mean = Tensor::new(&[0.48145466f32, 0.4578275, 0.40821073], device)?
                .reshape((3, 1, 1))?;
            let std = Tensor::new(&[0.26862954f32, 0.2613026, 0.2757771], device)?
                .reshape((3, 1, 1))?;
            t.broadcast_sub(&mean)?.broadcast_div(&std)
        })
        .map_err(candle_error)?;
    Ok(tensor)
}

fn candle_error(err: candle_core::Error) -> Error {
    inference_error(err.to_string())
}

fn inference_error(message: impl Into<String>) -> Error {
    Error::backend(FailureKind::Other, message)
}
