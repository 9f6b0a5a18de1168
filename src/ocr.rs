//! The OCR engine boundary. Plate-recognition algorithmics are out of scope; the core
//! only emits a request (crop path + boxes + class) and, later, consumes a result off
//! the bus — it never calls a recognizer directly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    pub plate_text: String,
    pub confidence: f32,
}
