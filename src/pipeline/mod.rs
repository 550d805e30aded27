//! Intake and refinement stages.
//!
//! Each submodule owns one collaborator boundary or one state machine, so
//! the refinement loop can be tested with fake collaborators and the real
//! collaborators can be swapped without touching the loop.
//!
//! ## Data Flow
//!
//! ```text
//! dispatch ──▶ rasterize ──▶ image intake ──▶ refine ⟲ (classify, extract)
//!    │           (pdfium)                        │
//!    └──────────────▶ text intake ◀──────────────┘
//! ```
//!
//! 1. [`rasterize`]: PDF → one PNG per page; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 2. [`classify`] : pure/mixed labelling via a vision model
//! 3. [`extract`]  : OCR/layout tool run over a directory of mixed images
//! 4. [`refine`]   : the bounded multi-pass loop tying 2 and 3 together

pub mod classify;
pub mod extract;
pub mod rasterize;
pub mod refine;
