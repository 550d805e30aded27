//! Near-duplicate removal for the final text and image sets.
//!
//! [`cluster`] is domain-agnostic: it works on item indices and similarity
//! scores only. [`text`] and [`image`] are the adapters that load files,
//! produce embeddings via [`embed`], keep the canonical files and write the
//! duplicate [`report`].
//!
//! | Stage | Algorithm | Threshold (default) |
//! |-------|-----------|---------------------|
//! | text  | streaming, [`cluster::StreamingDeduper`] | 0.99 |
//! | image | batch, [`cluster::cluster_batch`]        | 0.98 |

pub mod cluster;
pub mod embed;
pub mod image;
pub mod report;
pub mod text;
