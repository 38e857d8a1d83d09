#![forbid(unsafe_code)]

use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("matrix has no rows")]
    Empty,
    #[error("matrix is not square: {rows} rows but row {row} has {cols} columns")]
    NotSquare { rows: usize, row: usize, cols: usize },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A square integer matrix in row-major order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    cells: Vec<Vec<i64>>,
}

impl Matrix {
    /// Build from rows, rejecting empty, ragged, or non-square input.
    pub fn from_rows(cells: Vec<Vec<i64>>) -> Result<Self, FixtureError> {
        let rows = cells.len();
        if rows == 0 {
            return Err(FixtureError::Empty);
        }
        for (row, values) in cells.iter().enumerate() {
            if values.len() != rows {
                return Err(FixtureError::NotSquare {
                    rows,
                    row,
                    cols: values.len(),
                });
            }
        }
        Ok(Self { cells })
    }

    /// Deterministic random fill: equal `(dim, range, seed)` always produces
    /// the same matrix, independent of any other draw in the process.
    #[must_use]
    pub fn seeded(dim: usize, range: RangeInclusive<i64>, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let cells = (0..dim)
            .map(|_| (0..dim).map(|_| rng.gen_range(range.clone())).collect())
            .collect();
        Self { cells }
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<i64>] {
        &self.cells
    }

    /// Headerless CSV body: one row per line, comma-joined integers.
    pub fn to_csv_string(&self) -> Result<String, FixtureError> {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        for row in &self.cells {
            let fields = row.iter().map(i64::to_string).collect::<Vec<_>>();
            writer.write_record(&fields)?;
        }
        let bytes = writer.into_inner().map_err(|err| err.into_error())?;
        Ok(String::from_utf8(bytes)?)
    }
}

/// One generated fixture: the identifier the Engine knows it by, plus cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    pub id: String,
    pub matrix: Matrix,
}

impl Fixture {
    #[must_use]
    pub fn new(id: impl Into<String>, matrix: Matrix) -> Self {
        Self {
            id: id.into(),
            matrix,
        }
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.csv", self.id)
    }
}

/// Derive an independent seed for one fixture from the run's master seed.
///
/// splitmix64 finalizer over `master_seed + ordinal`; adjacent ordinals land
/// in unrelated parts of the stream, so reordering or dropping one fixture
/// never changes another fixture's content.
#[must_use]
pub fn derive_fixture_seed(master_seed: u64, ordinal: u64) -> u64 {
    let mut z = master_seed
        .wrapping_add(ordinal.wrapping_mul(0x9e37_79b9_7f4a_7c15))
        .wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Write one fixture as `<id>.csv` under `dir`. Creates `dir` if missing.
pub fn write_fixture(dir: &Path, fixture: &Fixture) -> Result<PathBuf, FixtureError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(fixture.file_name());
    fs::write(&path, fixture.matrix.to_csv_string()?)?;
    Ok(path)
}

/// The ordered fixture set for one harness run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureSet {
    fixtures: Vec<Fixture>,
}

/// Dimension used for the large-matrix block (M10/M11; M12 is one larger).
pub const LARGE_DIM: usize = 20;

impl FixtureSet {
    /// The standard twelve-fixture suite.
    ///
    /// M1..M8 are fixed literals; M9..M12 are seeded random draws. M6 equals
    /// the negated transpose of M5, so the anti-symmetry check of the pair is
    /// expected to report `True`. M12 is one dimension larger than M10/M11 to
    /// probe the mismatch paths.
    pub fn standard(master_seed: u64) -> Result<Self, FixtureError> {
        let seed_for = |ordinal: u64| derive_fixture_seed(master_seed, ordinal);
        let large = LARGE_DIM;

        let fixtures = vec![
            Fixture::new("M1", Matrix::from_rows(vec![
                vec![0, 1, 2],
                vec![3, 4, 5],
                vec![6, 7, 8],
            ])?),
            Fixture::new("M2", Matrix::from_rows(vec![
                vec![0, 10, 20],
                vec![30, 40, 50],
                vec![60, 70, 80],
            ])?),
            Fixture::new("M3", Matrix::from_rows(vec![vec![0]])?),
            Fixture::new("M4", Matrix::from_rows(vec![vec![1]])?),
            Fixture::new("M5", Matrix::from_rows(vec![vec![1, 2], vec![3, 4]])?),
            Fixture::new("M6", Matrix::from_rows(vec![vec![-1, -3], vec![-2, -4]])?),
            Fixture::new("M7", Matrix::from_rows(vec![vec![9, 10], vec![11, 12]])?),
            Fixture::new("M8", Matrix::from_rows(vec![
                vec![100, 200, 300],
                vec![400, 500, 600],
                vec![700, 800, 900],
            ])?),
            Fixture::new("M9", Matrix::seeded(5, -5..=5, seed_for(9))),
            Fixture::new("M10", Matrix::seeded(large, -10..=10, seed_for(10))),
            Fixture::new("M11", Matrix::seeded(large, -10..=10, seed_for(11))),
            Fixture::new("M12", Matrix::seeded(large + 1, -10..=10, seed_for(12))),
        ];

        Ok(Self { fixtures })
    }

    #[must_use]
    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    pub fn get(&self, id: &str) -> Option<&Fixture> {
        self.fixtures.iter().find(|fixture| fixture.id == id)
    }

    /// File names this set will create under the data directory.
    #[must_use]
    pub fn file_names(&self) -> Vec<String> {
        self.fixtures.iter().map(Fixture::file_name).collect()
    }

    /// Write every fixture under `dir`, returning the created paths in order.
    pub fn write_all(&self, dir: &Path) -> Result<Vec<PathBuf>, FixtureError> {
        self.fixtures
            .iter()
            .map(|fixture| write_fixture(dir, fixture))
            .collect()
    }
}
