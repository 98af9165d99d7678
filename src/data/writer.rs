use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

use super::model::{is_bad, SpecData};

/// Save a spectrum. Dispatch by extension: `.csv` writes a columnar CSV,
/// anything in the text family writes whitespace separated columns.
/// BAD values are written as `NaN`.
pub fn save_file(spec: &SpecData, path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => save_csv(spec, path),
        "txt" | "dat" | "asc" | "lis" | "text" => save_text(spec, path),
        other => bail!("Cannot save spectra as .{other}"),
    }
    .with_context(|| format!("saving '{}' to {}", spec.short_name, path.display()))?;

    log::info!("Saved '{}' to {}", spec.short_name, path.display());
    Ok(())
}

fn fmt_value(v: f64) -> String {
    if is_bad(v) {
        "NaN".to_string()
    } else {
        format!("{v}")
    }
}

fn save_text(spec: &SpecData, path: &Path) -> Result<()> {
    let file = File::create(path).context("creating text file")?;
    let mut out = BufWriter::new(file);

    writeln!(out, "# {}", spec.short_name)?;
    let errors = spec.y_errors();
    if errors.is_some() {
        writeln!(out, "# x y err")?;
    } else {
        writeln!(out, "# x y")?;
    }

    for (i, (&x, &y)) in spec.x_data().iter().zip(spec.y_data()).enumerate() {
        match errors {
            Some(e) => writeln!(out, "{} {} {}", fmt_value(x), fmt_value(y), fmt_value(e[i]))?,
            None => writeln!(out, "{} {}", fmt_value(x), fmt_value(y))?,
        }
    }
    out.flush()?;
    Ok(())
}

fn save_csv(spec: &SpecData, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;
    let errors = spec.y_errors();

    if errors.is_some() {
        writer.write_record(["x", "y", "err"])?;
    } else {
        writer.write_record(["x", "y"])?;
    }
    for (i, (&x, &y)) in spec.x_data().iter().zip(spec.y_data()).enumerate() {
        let mut row = vec![fmt_value(x), fmt_value(y)];
        if let Some(e) = errors {
            row.push(fmt_value(e[i]));
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
