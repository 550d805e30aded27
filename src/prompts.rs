//! Prompts sent to the vision model.
//!
//! The classifier only needs a single word back, so the prompt spells out
//! both allowed answers and nothing else. Parsing is lenient (see
//! [`crate::pipeline::classify::parse_label`]) because models still pad the
//! answer with punctuation or a sentence.

/// System prompt for the pure/mixed classifier.
pub const CLASSIFIER_SYSTEM_PROMPT: &str = "\
You label images for a document-processing pipeline.
An image is 'pure' when it is purely visual: a photo, drawing, chart or \
diagram with no readable text that would need OCR.
An image is 'mixed' when it contains any readable text, tables, captions, \
labels or page layout.
Reply with exactly one lowercase word: pure or mixed.";

/// User question attached to every image.
pub const CLASSIFIER_QUESTION: &str =
    "Does this image contain any text? Answer with only one word: 'pure' or 'mixed'.";
