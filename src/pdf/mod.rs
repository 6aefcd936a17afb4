pub mod encryption;
pub mod font;
pub mod overlay;

pub use overlay::{test_pdf_modifiable, test_signed_pdf, render_final, render_preview, OverlaySigner, PdfError};
