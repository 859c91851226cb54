//! Autoregressive text decoding for the caption model
//!
//! Greedy decoding: feed the image tensor plus the tokens generated so far,
//! take the argmax of the last-position logits, stop on EOS or max length.

use ndarray::{Array2, Array4};
use ort::{session::Session, value::Value};
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::debug;

use crate::CaptionError;
use image_studio_core::create_optimized_session;

/// Tokenizer plus ONNX session with the special token ids the loop needs
pub struct TextDecoder {
    tokenizer: Tokenizer,
    session: Session,
    bos_token_id: u32,
    eos_token_id: u32,
}

impl TextDecoder {
    /// Load the tokenizer and the ONNX session
    pub fn new(
        tokenizer_path: impl AsRef<Path>,
        model_path: impl AsRef<Path>,
    ) -> Result<Self, CaptionError> {
        let tokenizer = Tokenizer::from_file(tokenizer_path.as_ref())
            .map_err(|e| CaptionError::TokenizerError(format!("Failed to load tokenizer: {e}")))?;

        let session = create_optimized_session(model_path.as_ref())?;

        // BLIP's text side uses the BERT vocabulary: [CLS]=101, [SEP]=102
        let bos_token_id = tokenizer.token_to_id("[CLS]").unwrap_or(101);
        let eos_token_id = tokenizer.token_to_id("[SEP]").unwrap_or(102);

        debug!("Special tokens: BOS={}, EOS={}", bos_token_id, eos_token_id);

        Ok(Self {
            tokenizer,
            session,
            bos_token_id,
            eos_token_id,
        })
    }

    /// Generate caption text using greedy decoding
    ///
    /// # Arguments
    /// * `pixel_values` - Image tensor `[1, 3, S, S]`
    /// * `max_length` - Maximum caption length in tokens
    pub fn generate_greedy(
        &mut self,
        pixel_values: &Array4<f32>,
        max_length: usize,
    ) -> Result<String, CaptionError> {
        let mut input_ids = vec![self.bos_token_id as i64];

        debug!("Starting greedy generation (max_length={})", max_length);

        loop {
            let next_token_id = self.next_token(pixel_values, &input_ids)?;

            if next_token_id == self.eos_token_id as i64 {
                debug!("EOS after {} tokens", input_ids.len() - 1);
                break;
            }

            input_ids.push(next_token_id);

            if input_ids.len() > max_length {
                debug!("Reached max length, stopping generation");
                break;
            }
        }

        // Decode everything after the BOS token
        let token_ids: Vec<u32> = input_ids.iter().skip(1).map(|&id| id as u32).collect();
        let caption = self
            .tokenizer
            .decode(&token_ids, true)
            .map_err(|e| CaptionError::InvalidOutput(format!("Failed to decode tokens: {e}")))?;

        debug!("Generated caption: '{}'", caption);

        Ok(caption)
    }

    /// Run one decoder step and return the argmax token id for the last position
    fn next_token(
        &mut self,
        pixel_values: &Array4<f32>,
        input_ids: &[i64],
    ) -> Result<i64, CaptionError> {
        let seq_len = input_ids.len();

        let input_ids_array = Array2::from_shape_vec((1, seq_len), input_ids.to_vec())
            .map_err(|e| CaptionError::InvalidOutput(format!("Bad input_ids shape: {e}")))?;
        let attention_mask_array = Array2::from_elem((1, seq_len), 1i64);

        let pixel_values_tensor = Value::from_array(pixel_values.clone())?;
        let input_ids_tensor = Value::from_array(input_ids_array)?;
        let attention_mask_tensor = Value::from_array(attention_mask_array)?;

        let outputs = self.session.run(ort::inputs![
            "pixel_values" => pixel_values_tensor,
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
        ])?;

        // Logits come back as [batch, seq_len, vocab_size]
        let (logits_shape, logits_data) = outputs["logits"]
            .try_extract_tensor::<f32>()
            .map_err(|e| CaptionError::InvalidOutput(format!("Failed to extract logits: {e}")))?;

        if logits_shape.len() != 3 {
            return Err(CaptionError::InvalidOutput(format!(
                "Invalid logits shape: {:?}",
                logits_shape
            )));
        }

        let vocab_size = logits_shape[2] as usize;
        let last_offset = (seq_len - 1) * vocab_size;
        let last_logits = &logits_data[last_offset..last_offset + vocab_size];

        argmax(last_logits)
            .map(|idx| idx as i64)
            .ok_or_else(|| CaptionError::InvalidOutput("Empty logit vector".to_string()))
    }
}

/// Index of the largest value, None for an empty slice
fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[3.0]), Some(0));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_argmax_handles_nan() {
        // NaN entries must not panic the comparison
        assert_eq!(argmax(&[f32::NAN, 1.0, 0.5]), Some(1));
    }

    #[test]
    fn test_decoder_creation_requires_files() {
        // Missing files are an error, not a panic
        let result = TextDecoder::new("missing/tokenizer.json", "missing/blip.onnx");
        assert!(result.is_err());
    }

    #[test]
    fn test_decoder_with_real_model() {
        // Requires operator-supplied model artifacts; skip when absent
        let tokenizer_path = "models/captioning/tokenizer.json";
        let model_path = "models/captioning/blip.onnx";

        if std::path::Path::new(tokenizer_path).exists()
            && std::path::Path::new(model_path).exists()
        {
            let decoder = TextDecoder::new(tokenizer_path, model_path);
            assert!(decoder.is_ok());
        }
    }
}
