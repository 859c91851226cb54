//! Image Studio Core - shared infrastructure for the studio services
//!
//! This crate provides the pieces every service needs: decoding uploaded
//! byte buffers into bitmaps, encoding results back to PNG, building
//! optimized ONNX Runtime sessions, and the initialize-once model holder
//! that gives each service its process-lifetime singleton.

pub mod image_io;
pub mod model_cache;
pub mod onnx;

pub use image_io::{decode_image, encode_png_rgb, encode_png_rgba, ImageIoError};
pub use model_cache::LazyModel;
pub use onnx::{create_optimized_session, OnnxError};
