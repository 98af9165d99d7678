use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeListArray, ListArray, StringArray,
};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{MetadataValue, SpecData, BAD};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load the spectra held in a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.txt` / `.dat` / `.asc` / `.lis` – whitespace columns `x y [err]`
/// * `.csv`     – columns `x`, `y`, optional `err`; or one spectrum per row
///                with semicolon-separated arrays
/// * `.json`    – `[{ "x": [...], "y": [...], "err": [...]?, ...meta }, ...]`
/// * `.parquet` – Parquet file with `x`, `y` (and optional `err`) list columns
pub fn load_file(path: &Path) -> Result<Vec<SpecData>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let mut spectra = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path)?,
        "json" => load_json(path)?,
        "csv" => load_csv(path)?,
        "txt" | "dat" | "asc" | "lis" | "text" => vec![load_text(path)?],
        other => bail!("Unsupported file extension: .{other}"),
    };

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("spectrum")
        .to_string();
    let multiple = spectra.len() > 1;
    for (i, spec) in spectra.iter_mut().enumerate() {
        if spec.short_name.is_empty() {
            spec.short_name = if multiple {
                format!("{stem}[{i}]")
            } else {
                stem.clone()
            };
        }
        spec.full_name = path.display().to_string();
    }
    log::debug!("{}: {} spectra", path.display(), spectra.len());
    Ok(spectra)
}

/// Build a spectrum, mapping non-finite values to BAD.
fn build_spectrum(
    name: String,
    x: Vec<f64>,
    y: Vec<f64>,
    err: Option<Vec<f64>>,
    metadata: BTreeMap<String, MetadataValue>,
) -> Result<SpecData> {
    let clean = |v: Vec<f64>| -> Vec<f64> {
        v.into_iter()
            .map(|f| if f.is_finite() { f } else { BAD })
            .collect()
    };
    let mut spec = SpecData::new(name, clean(x), clean(y))?;
    if let Some(e) = err {
        spec = spec.with_errors(clean(e))?;
    }
    spec.metadata = metadata;
    Ok(spec)
}

/// Name for a spectrum taken from a `name` / `short_name` metadata value.
fn name_from_metadata(metadata: &BTreeMap<String, MetadataValue>) -> String {
    ["name", "short_name", "object"]
        .iter()
        .find_map(|key| match metadata.get(*key) {
            Some(MetadataValue::String(s)) => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Text loader
// ---------------------------------------------------------------------------

/// Plain columns of numbers: coordinate, data value and an optional error.
/// Fields are separated by whitespace or commas; lines starting with `#` or
/// `!` are comments. Extra columns are ignored.
fn load_text(path: &Path) -> Result<SpecData> {
    let text = std::fs::read_to_string(path).context("reading text file")?;
    let (x, y, err) = parse_text_columns(&text)?;
    build_spectrum(String::new(), x, y, err, BTreeMap::new())
}

fn parse_text_columns(text: &str) -> Result<(Vec<f64>, Vec<f64>, Option<Vec<f64>>)> {
    let mut x = Vec::new();
    let mut y = Vec::new();
    let mut err: Vec<f64> = Vec::new();
    let mut ncols: Option<usize> = None;

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let fields: Vec<f64> = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|f| !f.is_empty())
            .map(|f| {
                f.parse::<f64>()
                    .with_context(|| format!("line {}: '{f}' is not a number", line_no + 1))
            })
            .collect::<Result<_>>()?;

        let n = fields.len().min(3);
        if n < 2 {
            bail!("line {}: need at least two columns", line_no + 1);
        }
        match ncols {
            None => ncols = Some(n),
            Some(c) if c != n => {
                bail!("line {}: expected {c} columns, found {n}", line_no + 1)
            }
            _ => {}
        }
        x.push(fields[0]);
        y.push(fields[1]);
        if n == 3 {
            err.push(fields[2]);
        }
    }
    if x.is_empty() {
        bail!("no data rows found");
    }
    let err = (ncols == Some(3)).then_some(err);
    Ok((x, y, err))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records')`):
///
/// ```json
/// [
///   {
///     "x": [4000.0, 4001.0, ...],
///     "y": [0.12,   0.14,  ...],
///     "err": [0.01, 0.01, ...],
///     "object": "NGC 1068"
///   },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<Vec<SpecData>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = match &root {
        JsonValue::Array(records) => records.clone(),
        JsonValue::Object(_) => vec![root.clone()],
        _ => bail!("Expected a JSON array or object"),
    };

    let mut spectra = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let x = json_array_to_f64(obj.get("x"), i, "x")?;
        let y = json_array_to_f64(obj.get("y"), i, "y")?;
        let err = match obj.get("err").or_else(|| obj.get("error")) {
            Some(v) => Some(json_array_to_f64(Some(v), i, "err")?),
            None => None,
        };

        if x.len() != y.len() {
            bail!("Row {i}: x has {} values but y has {}", x.len(), y.len());
        }

        let mut metadata = BTreeMap::new();
        for (key, val) in obj {
            if matches!(key.as_str(), "x" | "y" | "err" | "error") {
                continue;
            }
            metadata.insert(key.clone(), json_to_metadata(val));
        }

        let name = name_from_metadata(&metadata);
        spectra.push(
            build_spectrum(name, x, y, err, metadata).with_context(|| format!("Row {i}"))?,
        );
    }

    Ok(spectra)
}

/// Numbers, with `null` standing for a missing sample.
fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| match v {
            JsonValue::Null => Ok(f64::NAN),
            _ => v
                .as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number")),
        })
        .collect()
}

fn json_to_metadata(val: &JsonValue) -> MetadataValue {
    match val {
        JsonValue::String(s) => MetadataValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                MetadataValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                MetadataValue::Float(f)
            } else {
                MetadataValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => MetadataValue::Bool(*b),
        JsonValue::Null => MetadataValue::Null,
        other => MetadataValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Two CSV layouts are understood, both with a header row:
///
/// * columnar: one sample per row, columns `x`, `y` and optionally `err`;
/// * per-spectrum: one spectrum per row, `x`/`y`/`err` cells holding
///   semicolon-separated floats (`"4000.0;4001.0"`), all other columns
///   treated as metadata.
fn load_csv(path: &Path) -> Result<Vec<SpecData>> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let x_idx = headers
        .iter()
        .position(|h| h == "x")
        .context("CSV missing 'x' column")?;
    let y_idx = headers
        .iter()
        .position(|h| h == "y")
        .context("CSV missing 'y' column")?;
    let err_idx = headers.iter().position(|h| h == "err" || h == "error");

    let records: Vec<csv::StringRecord> = reader
        .records()
        .enumerate()
        .map(|(row_no, r)| r.with_context(|| format!("CSV row {row_no}")))
        .collect::<Result<_>>()?;

    let per_spectrum = records
        .first()
        .and_then(|r| r.get(x_idx))
        .is_some_and(|cell| cell.contains(';'));

    if !per_spectrum {
        let column = |idx: usize, col: &str| -> Result<Vec<f64>> {
            records
                .iter()
                .enumerate()
                .map(|(row_no, r)| parse_cell(r.get(idx).unwrap_or(""), row_no, col))
                .collect()
        };
        let x = column(x_idx, "x")?;
        let y = column(y_idx, "y")?;
        let err = err_idx.map(|i| column(i, "err")).transpose()?;
        return Ok(vec![build_spectrum(String::new(), x, y, err, BTreeMap::new())?]);
    }

    let mut spectra = Vec::new();
    for (row_no, record) in records.iter().enumerate() {
        let x = parse_semicolon_floats(record.get(x_idx).unwrap_or(""), row_no, "x")?;
        let y = parse_semicolon_floats(record.get(y_idx).unwrap_or(""), row_no, "y")?;
        let err = err_idx
            .map(|i| parse_semicolon_floats(record.get(i).unwrap_or(""), row_no, "err"))
            .transpose()?;

        if x.len() != y.len() {
            bail!(
                "CSV row {row_no}: x has {} values but y has {}",
                x.len(),
                y.len()
            );
        }

        let mut metadata = BTreeMap::new();
        for (col_idx, value) in record.iter().enumerate() {
            if col_idx == x_idx || col_idx == y_idx || Some(col_idx) == err_idx {
                continue;
            }
            let col_name = &headers[col_idx];
            metadata.insert(col_name.clone(), guess_metadata_type(value));
        }

        let name = name_from_metadata(&metadata);
        spectra.push(build_spectrum(name, x, y, err, metadata)?);
    }

    Ok(spectra)
}

/// An empty cell or `NaN` is a missing sample.
fn parse_cell(s: &str, row: usize, col: &str) -> Result<f64> {
    let tok = s.trim();
    if tok.is_empty() {
        return Ok(f64::NAN);
    }
    tok.parse::<f64>()
        .with_context(|| format!("Row {row}, {col}: '{tok}' is not a number"))
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    s.split(';')
        .enumerate()
        .map(|(j, tok)| parse_cell(tok, row, &format!("{col}[{j}]")))
        .collect()
}

fn guess_metadata_type(s: &str) -> MetadataValue {
    if s.is_empty() {
        return MetadataValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return MetadataValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return MetadataValue::Float(f);
    }
    if s == "true" || s == "false" {
        return MetadataValue::Bool(s == "true");
    }
    MetadataValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file containing spectra.
///
/// Expected schema:
/// - `x`: List<Float64> or LargeList<Float64> – coordinate arrays
/// - `y`: List<Float64> or LargeList<Float64> – data value arrays
/// - `err`: optional list column of data errors
/// - Any other columns are treated as metadata (strings, ints, floats, bools)
fn load_parquet(path: &Path) -> Result<Vec<SpecData>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut spectra = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        let n_rows = batch.num_rows();

        let x_idx = schema
            .index_of("x")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'x' column"))?;
        let y_idx = schema
            .index_of("y")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'y' column"))?;
        let err_idx = schema.index_of("err").ok();

        let x_col = batch.column(x_idx);
        let y_col = batch.column(y_idx);

        let meta_cols: Vec<(usize, String)> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != x_idx && *i != y_idx && Some(*i) != err_idx)
            .map(|(i, f)| (i, f.name().clone()))
            .collect();

        for row in 0..n_rows {
            let x = extract_f64_list(x_col, row)
                .with_context(|| format!("Row {row}: failed to read 'x'"))?;
            let y = extract_f64_list(y_col, row)
                .with_context(|| format!("Row {row}: failed to read 'y'"))?;
            let err = match err_idx {
                Some(i) if !batch.column(i).is_null(row) => Some(
                    extract_f64_list(batch.column(i), row)
                        .with_context(|| format!("Row {row}: failed to read 'err'"))?,
                ),
                _ => None,
            };

            if x.len() != y.len() {
                bail!("Row {row}: x has {} values but y has {}", x.len(), y.len());
            }

            let mut metadata = BTreeMap::new();
            for (col_idx, col_name) in &meta_cols {
                let value = extract_metadata_value(batch.column(*col_idx), row);
                metadata.insert(col_name.clone(), value);
            }

            let name = name_from_metadata(&metadata);
            spectra.push(build_spectrum(name, x, y, err, metadata)?);
        }
    }

    Ok(spectra)
}

// -- Parquet / Arrow helpers --

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    // Null elements are missing samples.
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.map_or(f64::NAN, f64::from)).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

/// Extract a single metadata value from an Arrow column at a given row.
fn extract_metadata_value(col: &Arc<dyn Array>, row: usize) -> MetadataValue {
    if col.is_null(row) {
        return MetadataValue::Null;
    }
    let any = col.as_any();
    match col.data_type() {
        DataType::Utf8 => match any.downcast_ref::<StringArray>() {
            Some(s) => MetadataValue::String(s.value(row).to_string()),
            None => MetadataValue::Null,
        },
        DataType::LargeUtf8 => {
            MetadataValue::String(col.as_string::<i64>().value(row).to_string())
        }
        DataType::Int32 => any
            .downcast_ref::<Int32Array>()
            .map_or(MetadataValue::Null, |a| MetadataValue::Integer(a.value(row) as i64)),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map_or(MetadataValue::Null, |a| MetadataValue::Integer(a.value(row))),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map_or(MetadataValue::Null, |a| MetadataValue::Float(a.value(row) as f64)),
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map_or(MetadataValue::Null, |a| MetadataValue::Float(a.value(row))),
        DataType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map_or(MetadataValue::Null, |a| MetadataValue::Bool(a.value(row))),
        _ => MetadataValue::String(format!("{:?}", col.data_type())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::is_bad;
    use arrow::array::{Float64Builder, ListBuilder};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rusty_splat_loader_{}_{name}", std::process::id()))
    }

    #[test]
    fn json_records_with_nulls_and_names() {
        let path = temp_path("records.json");
        let text = r#"[
            {"object": "A", "x": [1, 2, 3], "y": [1.0, null, 3.0], "err": [0.1, 0.1, 0.1]},
            {"x": [1, 2], "y": [5, 6], "exposure": 30}
        ]"#;
        std::fs::write(&path, text).unwrap();
        let spectra = load_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(spectra.len(), 2);
        let a = &spectra[0];
        assert_eq!(a.short_name, "A");
        assert_eq!(a.y_data()[1], BAD);
        assert_eq!(a.y_errors().unwrap(), &[0.1, 0.1, 0.1][..]);
        assert_eq!(a.full_name, path.display().to_string());

        let b = &spectra[1];
        let stem = path.file_stem().unwrap().to_str().unwrap();
        assert_eq!(b.short_name, format!("{stem}[1]"));
        assert!(!b.have_errors());
        assert_eq!(b.metadata.get("exposure"), Some(&MetadataValue::Integer(30)));
    }

    #[test]
    fn json_length_mismatch_is_an_error() {
        let path = temp_path("ragged.json");
        std::fs::write(&path, r#"{"x": [1, 2, 3], "y": [1, 2]}"#).unwrap();
        let result = load_file(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    fn list_column(rows: &[Option<Vec<Option<f64>>>]) -> ListArray {
        let mut builder = ListBuilder::new(Float64Builder::new());
        for row in rows {
            match row {
                Some(values) => {
                    for v in values {
                        builder.values().append_option(*v);
                    }
                    builder.append(true);
                }
                None => builder.append(false),
            }
        }
        builder.finish()
    }

    #[test]
    fn parquet_lists_errors_and_metadata() {
        let item = || Arc::new(Field::new("item", DataType::Float64, true));
        let schema = Arc::new(Schema::new(vec![
            Field::new("x", DataType::List(item()), false),
            Field::new("y", DataType::List(item()), false),
            Field::new("err", DataType::List(item()), true),
            Field::new("name", DataType::Utf8, true),
            Field::new("noise", DataType::Float64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(list_column(&[
                    Some(vec![Some(1.0), Some(2.0), Some(3.0)]),
                    Some(vec![Some(1.0), Some(2.0)]),
                ])),
                Arc::new(list_column(&[
                    Some(vec![Some(4.0), None, Some(6.0)]),
                    Some(vec![Some(7.0), Some(f64::NAN)]),
                ])),
                Arc::new(list_column(&[Some(vec![Some(0.5), Some(0.5), Some(0.5)]), None])),
                Arc::new(StringArray::from(vec![Some("target"), None])),
                Arc::new(Float64Array::from(vec![0.02, 0.01])),
            ],
        )
        .unwrap();

        let path = temp_path("spectra.parquet");
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let spectra = load_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(spectra.len(), 2);
        let target = &spectra[0];
        assert_eq!(target.short_name, "target");
        assert_eq!(target.x_data(), &[1.0, 2.0, 3.0][..]);
        assert_eq!(target.y_data()[1], BAD);
        assert_eq!(target.y_errors().unwrap(), &[0.5, 0.5, 0.5][..]);
        assert_eq!(target.metadata.get("noise"), Some(&MetadataValue::Float(0.02)));

        let other = &spectra[1];
        let stem = path.file_stem().unwrap().to_str().unwrap();
        assert_eq!(other.short_name, format!("{stem}[1]"));
        assert_eq!(other.y_data()[1], BAD);
        assert!(!other.have_errors());
        assert_eq!(other.metadata.get("name"), Some(&MetadataValue::Null));
    }

    #[test]
    fn text_columns_with_errors_and_comments() {
        let (x, y, err) = parse_text_columns("# wave flux err\n1 2 0.1\n2, 3, 0.2\n! end\n").unwrap();
        assert_eq!(x, vec![1.0, 2.0]);
        assert_eq!(y, vec![2.0, 3.0]);
        assert_eq!(err.unwrap(), vec![0.1, 0.2]);
    }

    #[test]
    fn text_columns_reject_ragged_rows() {
        assert!(parse_text_columns("1 2\n3 4 5\n").is_err());
        assert!(parse_text_columns("# only comments\n").is_err());
    }

    #[test]
    fn non_finite_values_become_bad() {
        let spec = build_spectrum(
            "nan".into(),
            vec![1.0, 2.0],
            vec![f64::NAN, 1.0],
            None,
            BTreeMap::new(),
        )
        .unwrap();
        assert!(is_bad(spec.y_data()[0]));
        assert_eq!(spec.y_data()[0], BAD);
    }

    #[test]
    fn metadata_guessing() {
        assert_eq!(guess_metadata_type("3"), MetadataValue::Integer(3));
        assert_eq!(guess_metadata_type("2.5"), MetadataValue::Float(2.5));
        assert_eq!(guess_metadata_type("true"), MetadataValue::Bool(true));
        assert_eq!(guess_metadata_type(""), MetadataValue::Null);
    }
}
