//! Offline/online hybrid routing and the OCR boundary built on it.

mod hybrid;
mod ocr;

pub use hybrid::{Backend, HybridRouter, RouteObserver, RouteOptions, RouteState};
pub use ocr::{decode_image_payload, Recognition, RecognizeOptions, Recognizer, RecognizerProvider};
