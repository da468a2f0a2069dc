// lib.rs
//! # attriml
//!
//! The analytics core behind a student-attrition ("deserción") dashboard: it pulls
//! semi-structured student documents out of a document store, flattens them into a
//! fixed tabular schema, derives deterministic feature encodings, aggregates
//! attrition statistics for display, and scores hypothetical students against a
//! pre-trained dropout classifier.
//!
//! The chart layer, page layout and classifier internals are external
//! collaborators; this crate owns everything between the raw document and the flat
//! numeric data those collaborators consume.
//!
//! ## `flatten_utils`
//!
//! - **Purpose**: Convert one semi-structured `StudentDocument` into one `FlatRecord`.
//! - **Features**:
//!   - Typed decode of the nested document sections (personal, academic, location,
//!     schooling, ICFES, performance, status, period).
//!   - All defaulting in one documented pass; every record from the same population
//!     carries the identical column set.
//!   - Skip-and-count rejection of documents without a usable `_id`, with totals
//!     that always reconcile against the input count.
//!
//! ## `encode_utils`
//!
//! - **Purpose**: Turn a `FlatRecord` into a fixed-width numeric feature vector.
//! - **Features**:
//!   - `build_context` derives categorical level codes, scaling statistics and the
//!     failure-department column list from the reference population,
//!     deterministically.
//!   - `encode` maps a record under an explicitly passed context: out-of-vocabulary
//!     values get a reserved sentinel code, zero-deviation fields scale to 0, and
//!     unknown departments are dropped with a warning rather than widening the
//!     vector.
//!   - Width mismatches are structural errors, never silently padded or truncated.
//!
//! ## `stats_utils`
//!
//! - **Purpose**: Descriptive aggregation feeding the chart layer.
//! - **Features**: KPI summary, attrition-rate slices per categorical dimension,
//!   local/international geographic splits, multi-select filters, CSV export.
//!
//! ## `store_utils`
//!
//! - **Purpose**: Query the student document store over its HTTP data API.
//! - **Features**: `find_all` and `count`, credentials from `~/.attriml/secrets.json`
//!   or the environment, endpoint validation.
//!
//! ## `cache_utils`
//!
//! - **Purpose**: Cache the flattened population and its encoding context as one
//!   value, keyed by a population fingerprint with a bounded TTL.
//!
//! ## `geo_utils`
//!
//! - **Purpose**: Fetch and cache the geographic boundary reference consumed by the
//!   map view.
//!
//! ## `model_utils`
//!
//! - **Purpose**: The classifier boundary and the what-if scoring path.
//! - **Features**: Model metadata (trained feature width, names, performance),
//!   shape validation before every prediction, a remote inference classifier, and
//!   `score_what_if`, which always encodes with the population snapshot's context.
//!
//! ## `dashboard_utils`
//!
//! - **Purpose**: One synchronous render pass per request, with per-view
//!   degradation: an unreachable upstream marks its views unavailable and leaves
//!   the rest standing.
//!
//! ## License
//!
//! This project is licensed under the MIT License.

pub mod cache_utils;
pub mod dashboard_utils;
pub mod encode_utils;
pub mod flatten_utils;
pub mod geo_utils;
pub mod model_utils;
pub mod stats_utils;
pub mod store_utils;
