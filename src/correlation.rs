use crate::{
    IcwError,
    clusterer::Clustering,
    column_writers::{ColumnContext, ColumnWriter, correlated_clusters},
    config::{ClusterConfig, MatrixConfig},
    model::{ClusterableMatch, Tag},
    progress::Progress,
    sink::{Cell, CellRange, ColorScale, Sheet, TabularSink},
};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

/// Lays the ordered leaves out as a relationship matrix and hands it to a
/// sink, one output per slice of columns.
pub struct CorrelationWriter {
    owner_id: String,
    matrix: MatrixConfig,
    cluster: ClusterConfig,
    progress: Arc<Progress>,
}

impl CorrelationWriter {
    pub fn new(owner_id: &str, matrix: MatrixConfig, cluster: ClusterConfig) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            matrix,
            cluster,
            progress: Arc::new(Progress::new()),
        }
    }

    pub fn with_progress(mut self, progress: Arc<Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Write the matrix, returning the saved file names in order. No leaves
    /// or no candidate columns writes nothing.
    #[instrument(skip_all, fields(output = %output_path.display()))]
    pub fn output_correlation<S: TabularSink>(
        &self,
        sink: &mut S,
        output_path: &Path,
        clustering: &Clustering,
        matches: &[ClusterableMatch],
        tags: &[Tag],
    ) -> Result<Vec<PathBuf>, IcwError> {
        let by_index: FxHashMap<usize, &ClusterableMatch> = matches.iter().map(|m| (m.index, m)).collect();
        let rows: Vec<_> = clustering
            .tree
            .ordered_leaves()
            .into_iter()
            .filter_map(|leaf| by_index.get(&leaf.index).map(|m| (leaf, *m)))
            .collect();
        if rows.is_empty() {
            info!("no matches to write");
            return Ok(Vec::new());
        }

        let row_matches: Vec<&ClusterableMatch> = rows.iter().map(|(_, m)| *m).collect();
        let Some(lowest) = lowest_clusterable_centimorgans(
            &row_matches,
            &by_index,
            self.matrix.lowest_clusterable_centimorgans,
        ) else {
            info!("no shared matches above the clusterable threshold");
            return Ok(Vec::new());
        };

        // Weaker matches are never reported as shared matches, so they stay
        // rows but would only ever be empty columns.
        let columns: Vec<&ClusterableMatch> = row_matches
            .iter()
            .copied()
            .filter(|m| m.shared_centimorgans() >= lowest)
            .collect();

        if self.matrix.max_matches_per_file == 0 {
            return Err(IcwError::Capacity("max matches per file must be at least 1".to_string()));
        }
        let writers = ColumnWriter::select(&row_matches, &self.owner_id, self.matrix.host_name.as_deref(), tags);
        if writers.len() >= sink.max_columns() {
            return Err(IcwError::Capacity(format!(
                "{} descriptive columns leave no room for the matrix in {} available",
                writers.len(),
                sink.max_columns()
            )));
        }
        // The configured limit is an upper bound; the sink's width wins.
        let per_file = self
            .matrix
            .max_matches_per_file
            .min(sink.max_columns() - writers.len());
        let file_count = columns.len().div_ceil(per_file);

        let context = ColumnContext {
            numbers: clustering.numbers.clone(),
            correlated: correlated_clusters(
                &row_matches,
                &clustering.numbers,
                self.cluster.strong_match_centimorgans,
                self.cluster.min_cluster_size,
            ),
        };

        info!(
            rows = rows.len(),
            columns = columns.len(),
            lowest_centimorgans = lowest,
            files = file_count,
            "writing correlation matrix"
        );
        self.progress.reset("Saving clusters", rows.len() * file_count);

        let mut files = Vec::with_capacity(file_count);
        for (file_num, chunk) in columns.chunks(per_file).enumerate() {
            let mut sheet = sink.begin_output(&self.matrix.worksheet_name)?;

            let headers = writers
                .iter()
                .map(ColumnWriter::header)
                .chain(chunk.iter().map(|m| m.matched.name.clone()))
                .collect();
            sheet.write_header(headers)?;

            let chunk_indexes: Vec<usize> = chunk.iter().map(|m| m.index).collect();
            for (row, (leaf, m)) in rows.iter().enumerate() {
                let cells = writers
                    .iter()
                    .map(|w| w.value(m, &context))
                    .chain(leaf.coords_array(&chunk_indexes).into_iter().map(|degree| match degree {
                        0 => Cell::Empty,
                        d => Cell::Integer(d as i64),
                    }))
                    .collect();
                sheet.write_row(row + 1, cells)?;
                self.progress.increment();
            }

            sheet.apply_heatmap(
                CellRange {
                    first_row: 1,
                    first_col: writers.len(),
                    last_row: rows.len(),
                    last_col: writers.len() + chunk.len() - 1,
                },
                ColorScale::relationship(),
            );
            sheet.freeze(1, writers.len());

            files.push(sink.save(sheet, &suffixed_file_name(output_path, file_num))?);
        }
        Ok(files)
    }
}

/// Smallest shared cM among the matches anybody lists as a shared match, not
/// counting those below `threshold`.
fn lowest_clusterable_centimorgans(
    rows: &[&ClusterableMatch],
    by_index: &FxHashMap<usize, &ClusterableMatch>,
    threshold: f64,
) -> Option<f64> {
    rows.iter()
        .flat_map(|m| m.coords.iter().filter(move |&&c| c != m.index))
        .filter_map(|c| by_index.get(c))
        .map(|m| m.shared_centimorgans())
        .filter(|&cm| cm >= threshold)
        .min_by(f64::total_cmp)
}

/// `clusters.csv`, `clusters-2.csv`, `clusters-3.csv`, ...
pub fn suffixed_file_name(path: &Path, file_num: usize) -> PathBuf {
    if file_num == 0 {
        return path.to_path_buf();
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, file_num + 1, ext.to_string_lossy()),
        None => format!("{}-{}", stem, file_num + 1),
    };
    path.with_file_name(name)
}
