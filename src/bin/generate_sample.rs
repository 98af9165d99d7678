use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Float64Builder, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use rusty_splat::fit::ProfileKind;

/// A line in a synthetic spectrum: profile, scale, centre and widths.
struct LineSpec {
    kind: ProfileKind,
    params: Vec<f64>,
}

fn generate_spectrum(
    coords: &[f64],
    continuum: (f64, f64),
    lines: &[LineSpec],
    noise_level: f64,
    rng: &mut SimpleRng,
) -> Vec<f64> {
    let x0 = coords[0];
    coords
        .iter()
        .map(|&x| {
            let signal: f64 = lines.iter().map(|l| l.kind.value(x, &l.params)).sum();
            continuum.0 + continuum.1 * (x - x0) + signal + rng.gauss(0.0, noise_level)
        })
        .collect()
}

/// Blank out `len` samples from `start` as a gap of missing data.
fn add_gap(values: &mut [f64], start: usize, len: usize) {
    let end = (start + len).min(values.len());
    for v in &mut values[start.min(end)..end] {
        *v = f64::NAN;
    }
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn list_array(rows: &[Vec<f64>]) -> arrow::array::ListArray {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        let values = builder.values();
        for &v in row {
            values.append_value(v);
        }
        builder.append(true);
    }
    builder.finish()
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);

    // Wavelengths: 6400 → 6800 Angstrom, step 0.4
    let coords: Vec<f64> = (0..1000).map(|i| 6400.0 + i as f64 * 0.4).collect();

    let objects: [(&str, &str, f64, Vec<LineSpec>); 3] = [
        (
            "emission_nebula",
            "target",
            0.02,
            vec![
                LineSpec { kind: ProfileKind::Gaussian, params: vec![4.0, 6563.0, 1.8] },
                LineSpec { kind: ProfileKind::Gaussian, params: vec![1.3, 6583.5, 1.6] },
                LineSpec { kind: ProfileKind::Gaussian, params: vec![0.45, 6548.0, 1.6] },
                LineSpec { kind: ProfileKind::Lorentzian, params: vec![0.8, 6717.0, 1.2] },
                LineSpec { kind: ProfileKind::Lorentzian, params: vec![0.6, 6731.0, 1.2] },
            ],
        ),
        (
            "stellar_absorption",
            "target",
            0.01,
            vec![
                LineSpec { kind: ProfileKind::Voigt, params: vec![-0.6, 6563.0, 1.5, 2.0] },
                LineSpec { kind: ProfileKind::Gaussian, params: vec![-0.15, 6495.0, 0.8] },
                LineSpec { kind: ProfileKind::Gaussian, params: vec![-0.2, 6678.0, 1.0] },
            ],
        ),
        (
            "sky",
            "sky",
            0.005,
            vec![
                LineSpec { kind: ProfileKind::Gaussian, params: vec![0.9, 6498.7, 0.7] },
                LineSpec { kind: ProfileKind::Gaussian, params: vec![1.4, 6533.0, 0.7] },
                LineSpec { kind: ProfileKind::Gaussian, params: vec![1.1, 6604.1, 0.7] },
            ],
        ),
    ];

    let mut all_x: Vec<Vec<f64>> = Vec::new();
    let mut all_y: Vec<Vec<f64>> = Vec::new();
    let mut all_err: Vec<Vec<f64>> = Vec::new();
    let mut all_name: Vec<String> = Vec::new();
    let mut all_type: Vec<String> = Vec::new();
    let mut all_noise: Vec<f64> = Vec::new();

    for (i, (name, kind, noise, lines)) in objects.iter().enumerate() {
        let continuum = (1.0 + 0.2 * i as f64, 2.0e-4 * (i as f64 - 1.0));
        let mut y = generate_spectrum(&coords, continuum, lines, *noise, &mut rng);
        let mut err = vec![*noise; coords.len()];

        // A detector gap and a few dead pixels.
        add_gap(&mut y, 820 + 20 * i, 15);
        add_gap(&mut err, 820 + 20 * i, 15);
        for _ in 0..3 {
            let pixel = (rng.next_u64() % coords.len() as u64) as usize;
            y[pixel] = f64::NAN;
        }

        all_x.push(coords.clone());
        all_y.push(y);
        all_err.push(err);
        all_name.push(name.to_string());
        all_type.push(kind.to_string());
        all_noise.push(*noise);
    }

    let item = || Arc::new(Field::new("item", DataType::Float64, true));
    let schema = Arc::new(Schema::new(vec![
        Field::new("x", DataType::List(item()), false),
        Field::new("y", DataType::List(item()), false),
        Field::new("err", DataType::List(item()), false),
        Field::new("name", DataType::Utf8, false),
        Field::new("type", DataType::Utf8, false),
        Field::new("noise", DataType::Float64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(list_array(&all_x)),
            Arc::new(list_array(&all_y)),
            Arc::new(list_array(&all_err)),
            Arc::new(StringArray::from(
                all_name.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                all_type.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(all_noise)),
        ],
    )
    .context("creating record batch")?;

    // Write Parquet
    let output_path = "sample_spectra.parquet";
    let file = std::fs::File::create(output_path).context("creating output file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing writer")?;

    println!(
        "Wrote {} spectra ({} samples each) to {output_path}",
        all_name.len(),
        coords.len()
    );
    Ok(())
}
