/// Data layer: table model, loading, column resolution, filtering and
/// aggregation.
///
/// Architecture:
/// ```text
///  .xlsx / .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Table
///   └──────────┘
///        │
///        ▼
///   ┌──────────────────┐
///   │ pipeline::prepare │  required columns, columns::resolve,
///   └──────────────────┘  options, interval coverage (once per file)
///        │
///        ▼
///   ┌──────────────┐
///   │ pipeline::run │  filter → aggregate (per user selection)
///   └──────────────┘
/// ```

pub mod aggregate;
pub mod columns;
pub mod error;
pub mod filter;
pub mod loader;
pub mod model;
pub mod options;
pub mod pipeline;
