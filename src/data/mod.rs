/// Data layer: spectrum model, coordinate ranges, loading and saving.
///
/// Architecture:
/// ```text
///  .txt / .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Vec<SpecData>
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ SpecData  │  x, y, errors, BAD sentinel
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  ranges   │  coordinate ranges → compacted valid samples
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod ranges;
pub mod writer;
