//! Micrograph tiling and particle annotation matching
//!
//! A [`GridSpec`] lays a fixed grid of `dimH x dimW` tiles over an `H x W`
//! micrograph, dropping remainder pixels at the high-index edges. The same
//! decomposition is used to cut tiles out of micrographs and to bucket
//! particle annotations into cells.
//!
//! Annotation `x` runs along the grid's row axis and `y` along its column
//! axis. Cell membership is strict on both sides, so a point lying exactly on
//! a grid line belongs to no cell.

use crate::mrc::MrcStack;
use crate::structs::{
    CellIndex, CellKey, CryoError, GridSpec, MatchSkip, MicrographKey, Point, Result,
};
use ndarray::{s, Array2, ArrayView2};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolves a micrograph key to the file holding its pixels
pub type KeyToPath = Box<dyn Fn(MicrographKey) -> PathBuf + Send + Sync>;

/// Particle annotations grouped by micrograph, in file order
pub type ParticleMap = BTreeMap<MicrographKey, Vec<Point>>;

// ============================================================================
// Grid decomposition
// ============================================================================

impl GridSpec {
    /// Create a grid, rejecting zero-sized tiles
    ///
    /// # Errors
    /// Returns error if a tile dimension is zero or larger than the micrograph
    pub fn new(input_shape: (usize, usize), sample_shape: (usize, usize)) -> Result<Self> {
        let (h, w) = input_shape;
        let (dim_h, dim_w) = sample_shape;
        if dim_h == 0 || dim_w == 0 {
            return Err(CryoError::Config(format!(
                "tile shape must be positive, got {dim_h}x{dim_w}"
            )));
        }
        if dim_h > h || dim_w > w {
            return Err(CryoError::Config(format!(
                "tile shape {dim_h}x{dim_w} exceeds micrograph shape {h}x{w}"
            )));
        }
        Ok(Self {
            input_shape,
            sample_shape,
        })
    }

    /// Number of full tiles along the row axis
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.input_shape.0 / self.sample_shape.0
    }

    /// Number of full tiles along the column axis
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.input_shape.1 / self.sample_shape.1
    }

    #[must_use]
    pub const fn cell_count(&self) -> usize {
        self.rows() * self.cols()
    }

    /// Pixel extent actually covered by tiles
    #[must_use]
    pub const fn extent(&self) -> (usize, usize) {
        (
            self.rows() * self.sample_shape.0,
            self.cols() * self.sample_shape.1,
        )
    }

    /// All cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = CellIndex> {
        let cols = self.cols();
        (0..self.rows()).flat_map(move |row| (0..cols).map(move |col| CellIndex { row, col }))
    }

    /// Top-left pixel of a cell
    #[must_use]
    pub const fn origin(&self, cell: CellIndex) -> (usize, usize) {
        (cell.row * self.sample_shape.0, cell.col * self.sample_shape.1)
    }

    /// Strict containment test: boundary points are outside every cell
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn contains(&self, cell: CellIndex, point: Point) -> bool {
        let (oh, ow) = self.origin(cell);
        let (oh, ow) = (oh as f64, ow as f64);
        let (dim_h, dim_w) = (self.sample_shape.0 as f64, self.sample_shape.1 as f64);
        (oh < point.x && point.x < oh + dim_h) && (ow < point.y && point.y < ow + dim_w)
    }

    /// Express a point in the cell's local frame
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_local(&self, cell: CellIndex, point: Point) -> Point {
        let (oh, ow) = self.origin(cell);
        Point::new(point.x - oh as f64, point.y - ow as f64)
    }

    /// Points of `points` that fall strictly inside `cell`, optionally re-based
    #[must_use]
    pub fn match_points(&self, points: &[Point], cell: CellIndex, shift: bool) -> Vec<Point> {
        points
            .iter()
            .filter(|&&p| self.contains(cell, p))
            .map(|&p| if shift { self.to_local(cell, p) } else { p })
            .collect()
    }

    /// Cut a micrograph into tiles
    ///
    /// # Errors
    /// Returns error if the micrograph is smaller than the tiled extent
    pub fn tiles<T: Clone>(&self, data: ArrayView2<'_, T>) -> Result<BTreeMap<CellIndex, Array2<T>>> {
        let (need_h, need_w) = self.extent();
        let (have_h, have_w) = data.dim();
        if have_h < need_h || have_w < need_w {
            return Err(CryoError::Config(format!(
                "micrograph is {have_h}x{have_w}, grid needs at least {need_h}x{need_w}"
            )));
        }

        let (dim_h, dim_w) = self.sample_shape;
        Ok(self
            .cells()
            .map(|cell| {
                let (oh, ow) = self.origin(cell);
                let tile = data.slice(s![oh..oh + dim_h, ow..ow + dim_w]).to_owned();
                (cell, tile)
            })
            .collect())
    }
}

// ============================================================================
// Label parsing
// ============================================================================

/// Layout of the particle label table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelFormat {
    /// Lines skipped at the top of the file
    pub header_lines: usize,
    /// Lines skipped at the bottom of the file
    pub footer_lines: usize,
    /// Character offset of the micrograph key within the first field
    pub key_offset: usize,
    /// Character length of the micrograph key
    pub key_len: usize,
}

impl Default for LabelFormat {
    fn default() -> Self {
        Self {
            header_lines: 17,
            footer_lines: 1,
            key_offset: 18,
            key_len: 4,
        }
    }
}

impl LabelFormat {
    /// # Errors
    /// Returns error if the key window is empty
    pub fn validate(&self) -> Result<()> {
        if self.key_len == 0 {
            return Err(CryoError::Config("label key length must be positive".into()));
        }
        Ok(())
    }
}

/// Parse a particle table into per-micrograph annotation lists.
///
/// Any malformed body line aborts the whole parse.
///
/// # Errors
/// Returns `LabelParse` with the 1-based line number of the first bad line
pub fn parse_particles<R: BufRead>(reader: R, format: &LabelFormat) -> Result<ParticleMap> {
    format.validate()?;

    let lines = reader.lines().collect::<std::io::Result<Vec<String>>>()?;
    let skipped = format.header_lines + format.footer_lines;
    if lines.len() < skipped {
        return Err(CryoError::LabelParse {
            line: lines.len(),
            reason: format!(
                "expected at least {skipped} header/footer lines, found {}",
                lines.len()
            ),
        });
    }

    let mut particles = ParticleMap::new();
    let body = &lines[format.header_lines..lines.len() - format.footer_lines];
    for (idx, line) in body.iter().enumerate() {
        let (key, point) = parse_line(line, format).map_err(|reason| CryoError::LabelParse {
            line: format.header_lines + idx + 1,
            reason,
        })?;
        particles.entry(key).or_default().push(point);
    }

    Ok(particles)
}

fn parse_line(line: &str, format: &LabelFormat) -> std::result::Result<(MicrographKey, Point), String> {
    let fields: Vec<&str> = line.split_whitespace().take(3).collect();
    let [name, x, y] = fields[..] else {
        return Err(format!("expected 3 fields, found {}", fields.len()));
    };

    let window: String = name
        .chars()
        .skip(format.key_offset)
        .take(format.key_len)
        .collect();
    if window.chars().count() < format.key_len {
        return Err(format!(
            "field {name:?} too short for key at [{}..{}]",
            format.key_offset,
            format.key_offset + format.key_len
        ));
    }

    let key = window
        .parse::<MicrographKey>()
        .map_err(|e| format!("invalid micrograph key {window:?}: {e}"))?;
    let x = x.parse::<f64>().map_err(|e| format!("invalid x {x:?}: {e}"))?;
    let y = y.parse::<f64>().map_err(|e| format!("invalid y {y:?}: {e}"))?;

    Ok((key, Point::new(x, y)))
}

// ============================================================================
// Loader
// ============================================================================

/// Tiles micrographs and buckets their particle annotations
pub struct SubgraphLoader {
    grid: GridSpec,
    keys: Vec<MicrographKey>,
    key_to_path: KeyToPath,
    particles: ParticleMap,
}

impl SubgraphLoader {
    /// Create a loader, parsing the label file eagerly
    ///
    /// # Errors
    /// Returns error if the label file cannot be read or parsed
    pub fn new(
        grid: GridSpec,
        keys: Vec<MicrographKey>,
        key_to_path: KeyToPath,
        label_file: &Path,
        format: &LabelFormat,
    ) -> Result<Self> {
        let reader = BufReader::new(File::open(label_file)?);
        let particles = parse_particles(reader, format)?;
        info!(
            "Parsed {} particles across {} micrographs from {}",
            particles.values().map(Vec::len).sum::<usize>(),
            particles.len(),
            label_file.display()
        );
        Ok(Self::from_particles(grid, keys, key_to_path, particles))
    }

    /// Create a loader from already-parsed annotations
    #[must_use]
    pub fn from_particles(
        grid: GridSpec,
        keys: Vec<MicrographKey>,
        key_to_path: KeyToPath,
        particles: ParticleMap,
    ) -> Self {
        Self {
            grid,
            keys,
            key_to_path,
            particles,
        }
    }

    #[must_use]
    pub const fn grid(&self) -> &GridSpec {
        &self.grid
    }

    #[must_use]
    pub fn keys(&self) -> &[MicrographKey] {
        &self.keys
    }

    /// Load the full pixel array of one micrograph
    ///
    /// # Errors
    /// Returns error if the file is unreadable or holds more than one frame
    pub fn micrograph(&self, key: MicrographKey) -> Result<Array2<f32>> {
        let path = (self.key_to_path)(key);
        debug!("Loading micrograph {key} from {}", path.display());
        MrcStack::open(&path)?.into_single_frame()
    }

    /// Tiles of a single micrograph, keyed by cell
    ///
    /// # Errors
    /// Returns error if the micrograph cannot be loaded or is too small
    pub fn subgraphs_for(&self, key: MicrographKey) -> Result<BTreeMap<CellIndex, Array2<f32>>> {
        let data = self.micrograph(key)?;
        self.grid.tiles(data.view())
    }

    /// Tiles of every configured micrograph.
    ///
    /// Entries are ordered by micrograph key, then row-major, whatever the
    /// order of `keys`.
    ///
    /// # Errors
    /// Returns the first micrograph failure
    pub fn subgraphs(&self) -> Result<BTreeMap<CellKey, Array2<f32>>> {
        let mut out = BTreeMap::new();
        for &key in &self.keys {
            for (cell, tile) in self.subgraphs_for(key)? {
                out.insert(CellKey::new(key, cell), tile);
            }
        }
        Ok(out)
    }

    /// Annotations of one (micrograph, cell) pair
    ///
    /// # Errors
    /// Returns a [`MatchSkip`] when the pair has nothing to report
    pub fn match_cell(
        &self,
        key: MicrographKey,
        cell: CellIndex,
        shift: bool,
    ) -> std::result::Result<Vec<Point>, MatchSkip> {
        let points = self
            .particles
            .get(&key)
            .ok_or(MatchSkip::UnknownMicrograph(key))?;
        let matched = self.grid.match_points(points, cell, shift);
        if matched.is_empty() {
            return Err(MatchSkip::Empty);
        }
        Ok(matched)
    }

    /// Annotations bucketed by `(micrograph, row, col)`.
    ///
    /// Cells without annotations, and micrographs absent from the label file,
    /// have no entry. `shift` selects cell-local instead of absolute
    /// coordinates. Entries are ordered by micrograph key, then row-major,
    /// whatever the order of `keys`; a repeated key yields one entry.
    #[must_use]
    pub fn subgraph_annotations(&self, shift: bool) -> BTreeMap<CellKey, Vec<Point>> {
        let mut out = BTreeMap::new();
        for &key in &self.keys {
            for cell in self.grid.cells() {
                match self.match_cell(key, cell, shift) {
                    Ok(points) => {
                        out.insert(CellKey::new(key, cell), points);
                    }
                    Err(MatchSkip::UnknownMicrograph(k)) => {
                        debug!("Micrograph {k} has no annotations, skipping");
                        break;
                    }
                    Err(MatchSkip::Empty) => {}
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mrc::tests::write_mrc;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    const CASES: usize = 200;

    fn label_text(body: &[&str]) -> String {
        let mut text = String::new();
        for i in 0..17 {
            text.push_str(&format!("_header_line_{i}\n"));
        }
        for line in body {
            text.push_str(line);
            text.push('\n');
        }
        text.push_str("footer\n");
        text
    }

    fn loader_with(grid: GridSpec, particles: ParticleMap) -> SubgraphLoader {
        let keys = particles.keys().copied().collect();
        SubgraphLoader::from_particles(
            grid,
            keys,
            Box::new(|k: MicrographKey| PathBuf::from(format!("{k}.mrc"))),
            particles,
        )
    }

    fn random_grid(rng: &mut StdRng) -> GridSpec {
        let h = rng.random_range(1..=120);
        let w = rng.random_range(1..=120);
        let dim_h = rng.random_range(1..=h);
        let dim_w = rng.random_range(1..=w);
        GridSpec::new((h, w), (dim_h, dim_w)).expect("valid grid")
    }

    #[test]
    fn test_tiles_are_disjoint_and_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..CASES {
            let grid = random_grid(&mut rng);
            let (h, w) = grid.input_shape;
            let (dim_h, dim_w) = grid.sample_shape;

            let origins: Vec<_> = grid.cells().map(|c| grid.origin(c)).collect();
            for &(oh, ow) in &origins {
                assert!(oh + dim_h <= h && ow + dim_w <= w);
            }
            for (i, a) in origins.iter().enumerate() {
                for b in &origins[i + 1..] {
                    let rows_overlap = a.0 < b.0 + dim_h && b.0 < a.0 + dim_h;
                    let cols_overlap = a.1 < b.1 + dim_w && b.1 < a.1 + dim_w;
                    assert!(!(rows_overlap && cols_overlap), "{grid:?}: {a:?} overlaps {b:?}");
                }
            }

            // Each pixel value is unique, so disjoint tiles never repeat one
            let data = Array2::from_shape_fn((h, w), |(r, c)| r * w + c);
            let tiles = grid.tiles(data.view()).expect("tiles");
            let mut seen = std::collections::HashSet::new();
            for tile in tiles.values() {
                assert_eq!(tile.dim(), (dim_h, dim_w));
                for &v in tile {
                    assert!(seen.insert(v));
                }
            }
        }
    }

    #[test]
    fn test_tile_count() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..CASES {
            let grid = random_grid(&mut rng);
            let (h, w) = grid.input_shape;
            let (dim_h, dim_w) = grid.sample_shape;
            let data = Array2::<f32>::zeros((h, w));

            let tiles = grid.tiles(data.view()).expect("tiles");
            assert_eq!(tiles.len(), (h / dim_h) * (w / dim_w));
            assert_eq!(grid.cells().count(), grid.cell_count());
        }
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_annotation_exclusivity() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..CASES {
            let grid = random_grid(&mut rng);
            let (ext_h, ext_w) = grid.extent();
            let (dim_h, dim_w) = grid.sample_shape;

            // Interior points: the fractional offset keeps them off grid lines
            let interior = Point::new(
                rng.random_range(0..ext_h) as f64 + rng.random_range(0.01..0.99),
                rng.random_range(0..ext_w) as f64 + rng.random_range(0.01..0.99),
            );
            let hits = grid.cells().filter(|&c| grid.contains(c, interior)).count();
            assert_eq!(hits, 1, "{grid:?} {interior:?}");

            let on_row_line = Point::new(
                (rng.random_range(0..=grid.rows()) * dim_h) as f64,
                rng.random_range(0.0..ext_w as f64),
            );
            let on_col_line = Point::new(
                rng.random_range(0.0..ext_h as f64),
                (rng.random_range(0..=grid.cols()) * dim_w) as f64,
            );
            for p in [on_row_line, on_col_line] {
                assert_eq!(grid.cells().filter(|&c| grid.contains(c, p)).count(), 0);
            }
        }
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_rebasing_round_trip() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..CASES {
            let grid = random_grid(&mut rng);
            let (ext_h, ext_w) = grid.extent();
            let points: Vec<Point> = (0..20)
                .map(|_| {
                    Point::new(
                        rng.random_range(0.0..ext_h as f64),
                        rng.random_range(0.0..ext_w as f64),
                    )
                })
                .collect();

            let loader = loader_with(grid, ParticleMap::from([(3, points.clone())]));
            let local = loader.subgraph_annotations(true);
            let absolute = loader.subgraph_annotations(false);
            assert_eq!(local.keys().collect::<Vec<_>>(), absolute.keys().collect::<Vec<_>>());

            for (key, pts) in &local {
                let (oh, ow) = grid.origin(key.cell());
                for (p, orig) in pts.iter().zip(&absolute[key]) {
                    assert!((p.x + oh as f64 - orig.x).abs() < 1e-9);
                    assert!((p.y + ow as f64 - orig.y).abs() < 1e-9);
                    assert!(points.contains(orig));
                }
            }
        }
    }

    #[test]
    fn test_empty_cells_are_omitted() {
        let grid = GridSpec::new((56, 56), (28, 28)).expect("grid");
        let loader = loader_with(grid, ParticleMap::from([(1, vec![Point::new(10.0, 10.0)])]));

        let result = loader.subgraph_annotations(true);
        assert_eq!(result.len(), 1);
        assert!(result.contains_key(&CellKey { micrograph: 1, row: 0, col: 0 }));
        assert!(!result.contains_key(&CellKey { micrograph: 1, row: 1, col: 1 }));
        assert_eq!(
            loader.match_cell(1, CellIndex { row: 1, col: 1 }, true),
            Err(MatchSkip::Empty)
        );
    }

    #[test]
    fn test_example_scenario() {
        let grid = GridSpec::new((56, 56), (28, 28)).expect("grid");
        let cells: Vec<_> = grid.cells().map(|c| (c.row, c.col)).collect();
        assert_eq!(cells, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);

        let loader = loader_with(grid, ParticleMap::from([(7, vec![Point::new(30.0, 5.0)])]));
        let result = loader.subgraph_annotations(true);

        assert_eq!(result.len(), 1);
        let key = CellKey { micrograph: 7, row: 1, col: 0 };
        assert_eq!(result[&key], vec![Point::new(2.0, 5.0)]);
    }

    #[test]
    fn test_unknown_micrograph_is_skipped() {
        let grid = GridSpec::new((56, 56), (28, 28)).expect("grid");
        let mut loader = loader_with(grid, ParticleMap::from([(7, vec![Point::new(30.0, 5.0)])]));
        loader.keys = vec![99, 7];

        let result = loader.subgraph_annotations(true);
        assert_eq!(result.len(), 1);
        assert_eq!(
            loader.match_cell(99, CellIndex { row: 0, col: 0 }, true),
            Err(MatchSkip::UnknownMicrograph(99))
        );
    }

    #[test]
    fn test_annotations_ordered_by_key_then_cell() {
        let grid = GridSpec::new((56, 56), (28, 28)).expect("grid");
        let mut loader = loader_with(
            grid,
            ParticleMap::from([
                (3, vec![Point::new(40.0, 40.0), Point::new(10.0, 40.0)]),
                (12, vec![Point::new(10.0, 10.0)]),
            ]),
        );
        loader.keys = vec![12, 3, 12];

        let order: Vec<_> = loader
            .subgraph_annotations(false)
            .into_keys()
            .map(|k| (k.micrograph, k.row, k.col))
            .collect();
        assert_eq!(order, vec![(3, 0, 1), (3, 1, 1), (12, 0, 0)]);
    }

    #[test]
    fn test_parse_particles() {
        let text = label_text(&[
            "Micrographs/stack_0007_2x_SumCorr.mrc 30.0 5.0 extra",
            "Micrographs/stack_0012_2x_SumCorr.mrc 100.5 200.25",
            "Micrographs/stack_0007_2x_SumCorr.mrc 1.0 2.0",
        ]);
        let particles = parse_particles(Cursor::new(text), &LabelFormat::default()).expect("parse");

        assert_eq!(particles.len(), 2);
        assert_eq!(particles[&7], vec![Point::new(30.0, 5.0), Point::new(1.0, 2.0)]);
        assert_eq!(particles[&12], vec![Point::new(100.5, 200.25)]);
    }

    #[test]
    fn test_parse_particles_custom_format() {
        let text = "# key x y\nmic_42 1.5 2.5\n";
        let format = LabelFormat {
            header_lines: 1,
            footer_lines: 0,
            key_offset: 4,
            key_len: 2,
        };
        let particles = parse_particles(Cursor::new(text), &format).expect("parse");
        assert_eq!(particles[&42], vec![Point::new(1.5, 2.5)]);
    }

    #[test]
    fn test_parse_particles_bad_line_reports_number() {
        let text = label_text(&[
            "Micrographs/stack_0007_2x_SumCorr.mrc 30.0 5.0",
            "Micrographs/stack_0007_2x_SumCorr.mrc 30.0",
        ]);
        match parse_particles(Cursor::new(text), &LabelFormat::default()) {
            Err(CryoError::LabelParse { line, .. }) => assert_eq!(line, 19),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_particles_rejects_bad_key_and_coords() {
        for bad in [
            "Micrographs/stack_00x7_2x.mrc 1.0 2.0",
            "short 1.0 2.0",
            "Micrographs/stack_0007_2x.mrc one 2.0",
            "",
        ] {
            let text = label_text(&[bad]);
            assert!(
                matches!(
                    parse_particles(Cursor::new(text), &LabelFormat::default()),
                    Err(CryoError::LabelParse { line: 18, .. })
                ),
                "{bad:?} should fail"
            );
        }
    }

    #[test]
    fn test_parse_particles_short_file() {
        let text = "only\nthree\nlines\n";
        assert!(matches!(
            parse_particles(Cursor::new(text), &LabelFormat::default()),
            Err(CryoError::LabelParse { .. })
        ));
    }

    #[test]
    fn test_zero_key_len_rejected() {
        let format = LabelFormat {
            key_len: 0,
            ..LabelFormat::default()
        };
        assert!(matches!(
            parse_particles(Cursor::new(label_text(&[])), &format),
            Err(CryoError::Config(_))
        ));
    }

    #[test]
    fn test_grid_rejects_bad_shapes() {
        assert!(GridSpec::new((56, 56), (0, 28)).is_err());
        assert!(GridSpec::new((56, 56), (57, 28)).is_err());
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_loader_subgraphs_from_disk() {
        let micrograph = Array2::from_shape_fn((60, 58), |(r, c)| (r * 58 + c) as f32);
        let mrc = write_mrc(&[micrograph.clone()], ".mrc");
        let path = mrc.path().to_path_buf();

        let mut labels = NamedTempFile::new().expect("create temp file");
        labels
            .write_all(label_text(&["Micrographs/stack_0003_a.mrc 30.0 5.0"]).as_bytes())
            .expect("write labels");

        let grid = GridSpec::new((56, 56), (28, 28)).expect("grid");
        let loader = SubgraphLoader::new(
            grid,
            vec![3],
            Box::new(move |_: MicrographKey| path.clone()),
            labels.path(),
            &LabelFormat::default(),
        )
        .expect("loader");

        let tiles = loader.subgraphs().expect("subgraphs");
        assert_eq!(tiles.len(), 4);
        let tile = &tiles[&CellKey { micrograph: 3, row: 1, col: 1 }];
        assert_eq!(tile[[0, 0]], micrograph[[28, 28]]);
        assert_eq!(tile[[27, 27]], micrograph[[55, 55]]);

        let annotations = loader.subgraph_annotations(true);
        assert_eq!(
            annotations[&CellKey { micrograph: 3, row: 1, col: 0 }],
            vec![Point::new(2.0, 5.0)]
        );
    }

    #[test]
    fn test_small_micrograph_is_an_error() {
        let grid = GridSpec::new((56, 56), (28, 28)).expect("grid");
        let data = Array2::<f32>::zeros((40, 56));
        assert!(matches!(grid.tiles(data.view()), Err(CryoError::Config(_))));
    }
}
