use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::{GraphDesc, READ_BUFFER_SIZE};
use crate::error::{EngineError, Result};
use crate::types::{ByteEncodable, EdgeList, EdgeRecord, InEdge, VertexId};
use crate::util::{create_writer, finish_writer, write_record};

/// Streams one CSR pair (index file + edge file) to disk, vertex by vertex.
///
/// Vertices must be pushed in id order. Each push writes the vertex's starting offset to the
/// index file and its records to the edge file.
pub struct CsrWriter<R: ByteEncodable> {
    index: BufWriter<File>,
    edges: BufWriter<File>,
    index_path: PathBuf,
    edge_path: PathBuf,
    written: u64,
    _marker: PhantomData<R>,
}

impl<R: ByteEncodable> CsrWriter<R> {
    pub fn create(index_path: &Path, edge_path: &Path) -> Result<Self> {
        Ok(Self {
            index: create_writer(index_path)?,
            edges: create_writer(edge_path)?,
            index_path: index_path.to_path_buf(),
            edge_path: edge_path.to_path_buf(),
            written: 0,
            _marker: PhantomData,
        })
    }

    /// Appends the next vertex with the given edge records.
    pub fn push_vertex<I: IntoIterator<Item = R>>(&mut self, records: I) -> Result<()> {
        write_record(&mut self.index, &self.written, &self.index_path)?;
        for record in records {
            write_record(&mut self.edges, &record, &self.edge_path)?;
            self.written += 1;
        }
        Ok(())
    }

    /// Flushes both files and returns the number of edge records written.
    pub fn finish(self) -> Result<u64> {
        finish_writer(self.index, &self.index_path)?;
        finish_writer(self.edges, &self.edge_path)?;
        Ok(self.written)
    }
}

/// Converts an in-memory edge list into the binary files of a graph plus its description.
///
/// Files are named after the graph: `<name>.index`, `<name>.edge`, and with in-edges
/// `<name>.in-index`, `<name>.in-edge`; the description is `<name>.desc.yaml`.
pub struct GraphBuilder {
    dir: PathBuf,
    name: String,
    with_in_edges: bool,
    min_vert_id: VertexId,
}

impl GraphBuilder {
    pub fn new(dir: &Path, name: &str) -> Self {
        Self { dir: dir.to_path_buf(), name: name.to_owned(), with_in_edges: false, min_vert_id: 0 }
    }

    /// Numbers the vertices from `min_vert_id` instead of zero.
    pub fn with_min_vert_id(mut self, min_vert_id: VertexId) -> Self {
        self.min_vert_id = min_vert_id;
        self
    }

    /// Also writes the reverse adjacency.
    pub fn with_in_edges(mut self, with_in_edges: bool) -> Self {
        self.with_in_edges = with_in_edges;
        self
    }

    pub fn desc_path(&self) -> PathBuf {
        self.dir.join(format!("{}.desc.yaml", self.name))
    }

    /// Writes the graph and returns its description with resolved paths.
    ///
    /// Each vertex's neighbors are stored sorted by neighbor id.
    ///
    /// # Arguments
    /// * `list` - Edges over the dense ids `[min_vert_id, min_vert_id + list.vertex_count)`.
    ///
    /// # Returns
    /// The description that was saved next to the files.
    pub fn build<E: EdgeRecord>(&self, list: &EdgeList) -> Result<GraphDesc> {
        if list.vertex_count == 0 {
            return Err(EngineError::Config("cannot build a graph without vertices".to_owned()));
        }
        let min = self.min_vert_id;
        let end = min as u64 + list.vertex_count as u64;
        let outside = |vid: VertexId| vid < min || vid as u64 >= end;
        if let Some(&(src, dst, _)) = list.edges.iter().find(|(s, d, _)| outside(*s) || outside(*d)) {
            return Err(EngineError::Config(format!(
                "edge ({}, {}) leaves the id range [{}, {})",
                src, dst, min, end
            )));
        }
        if end > VertexId::MAX as u64 + 1 {
            return Err(EngineError::Config(format!("ids starting at {} overflow a vertex id", min)));
        }
        fs::create_dir_all(&self.dir).map_err(|e| EngineError::io(&self.dir, e))?;
        let vertex_count = list.vertex_count as usize;

        // Step 1. Bucket out-edges by source.
        let mut out_adj: Vec<Vec<(VertexId, f32)>> = vec![Vec::new(); vertex_count];
        for &(src, dst, weight) in &list.edges {
            out_adj[(src - min) as usize].push((dst, weight));
        }
        let vert_file = self.dir.join(format!("{}.index", self.name));
        let edge_file = self.dir.join(format!("{}.edge", self.name));
        let mut writer = CsrWriter::<E>::create(&vert_file, &edge_file)?;
        for neighbors in out_adj.iter_mut() {
            neighbors.sort_by_key(|&(dst, _)| dst);
            writer.push_vertex(neighbors.iter().map(|&(dst, weight)| E::from_parts(dst, weight)))?;
        }
        let num_edges = writer.finish()?;
        drop(out_adj);

        // Step 2. Reverse adjacency.
        let (in_vert_file, in_edge_file) = if self.with_in_edges {
            let mut in_adj: Vec<Vec<VertexId>> = vec![Vec::new(); vertex_count];
            for &(src, dst, _) in &list.edges {
                in_adj[(dst - min) as usize].push(src);
            }
            let in_vert_file = self.dir.join(format!("{}.in-index", self.name));
            let in_edge_file = self.dir.join(format!("{}.in-edge", self.name));
            let mut writer = CsrWriter::<InEdge>::create(&in_vert_file, &in_edge_file)?;
            for sources in in_adj.iter_mut() {
                sources.sort_unstable();
                writer.push_vertex(sources.iter().map(|&src| InEdge { src }))?;
            }
            writer.finish()?;
            (Some(in_vert_file), Some(in_edge_file))
        } else {
            (None, None)
        };

        // Step 3. Description.
        let desc = GraphDesc {
            min_vert_id: min,
            max_vert_id: min + (list.vertex_count - 1),
            num_edges,
            edge_type: E::EDGE_TYPE,
            vert_file,
            edge_file,
            in_vert_file,
            in_edge_file,
        };
        desc.save(&self.desc_path())?;
        info!(graph = %self.name, vertices = vertex_count, edges = num_edges, "graph files written");
        Ok(desc)
    }
}

/// Parses a whitespace-separated text edge list.
///
/// One edge per line as `src dst [weight]`; blank lines and lines starting with `#` are
/// skipped. The vertex count is one past the largest id seen.
///
/// # Arguments
/// * `path` - Path of the text file.
///
/// # Returns
/// The parsed edges, or a `Format` error naming the offending line.
pub fn read_edge_list(path: &Path) -> Result<EdgeList> {
    let file = File::open(path).map_err(|e| EngineError::io(path, e))?;
    let file_len = file.metadata().map_err(|e| EngineError::io(path, e))?.len();
    let reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

    let pb = ProgressBar::new(file_len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
            .map_err(|e| EngineError::Config(e.to_string()))?
            .progress_chars("=>-"),
    );
    pb.set_message("Edge List Loading.");

    let mut list = EdgeList::default();
    let mut max_id: Option<VertexId> = None;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| EngineError::io(path, e))?;
        pb.inc(line.len() as u64 + 1);
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let bad_line = || EngineError::format(path, format!("line {}: expected `src dst [weight]`", line_no + 1));
        let mut tokens = trimmed.split_whitespace();
        let src = tokens.next().and_then(|t| t.parse::<VertexId>().ok()).ok_or_else(bad_line)?;
        let dst = tokens.next().and_then(|t| t.parse::<VertexId>().ok()).ok_or_else(bad_line)?;
        let weight = match tokens.next() {
            Some(token) => token.parse::<f32>().map_err(|_| bad_line())?,
            None => 1.0,
        };
        max_id = Some(max_id.map_or(src.max(dst), |m| m.max(src).max(dst)));
        list.edges.push((src, dst, weight));
    }
    pb.finish_and_clear();

    list.vertex_count = match max_id {
        Some(max_id) => max_id + 1,
        None => 0,
    };
    Ok(list)
}

#[cfg(test)]
mod test_builder {
    use super::*;
    use crate::storage::mapped::RecordArray;
    use crate::types::Type2Edge;

    #[test]
    fn test_build_writes_sorted_csr() {
        let dir = tempfile::tempdir().unwrap();
        let mut list = EdgeList::new(4, &[(2, 0), (0, 3), (0, 1)]);
        list.edges[0].2 = 0.25;
        let desc = GraphBuilder::new(dir.path(), "small").with_in_edges(true).build::<Type2Edge>(&list).unwrap();

        assert_eq!(desc.num_edges, 3);
        assert_eq!(desc, GraphDesc::load(&dir.path().join("small.desc.yaml")).unwrap());

        let index = RecordArray::<u64>::open(&desc.vert_file).unwrap();
        assert_eq!((0..4).map(|i| index.get(i)).collect::<Vec<_>>(), vec![0, 2, 2, 3]);
        let edges = RecordArray::<Type2Edge>::open(&desc.edge_file).unwrap();
        assert_eq!(edges.get(0).dest, 1);
        assert_eq!(edges.get(1).dest, 3);
        assert_eq!(edges.get(2), Type2Edge { dest: 0, weight: 0.25 });

        let in_edges = RecordArray::<InEdge>::open(desc.in_edge_file.as_ref().unwrap()).unwrap();
        assert_eq!(in_edges.get(0).src, 2);
    }

    #[test]
    fn test_build_with_offset_ids() {
        let dir = tempfile::tempdir().unwrap();
        let list = EdgeList::new(3, &[(10, 12), (12, 11), (11, 10)]);
        let desc = GraphBuilder::new(dir.path(), "offset")
            .with_in_edges(true)
            .with_min_vert_id(10)
            .build::<Type2Edge>(&list)
            .unwrap();
        assert_eq!((desc.min_vert_id, desc.max_vert_id), (10, 12));
        assert_eq!(desc.vertex_count(), 3);

        let index = RecordArray::<u64>::open(&desc.vert_file).unwrap();
        assert_eq!((0..3).map(|i| index.get(i)).collect::<Vec<_>>(), vec![0, 1, 2]);
        let edges = RecordArray::<Type2Edge>::open(&desc.edge_file).unwrap();
        assert_eq!((0..3).map(|i| edges.get(i).dest).collect::<Vec<_>>(), vec![12, 10, 11]);

        let below = EdgeList::new(3, &[(9, 10)]);
        assert!(GraphBuilder::new(dir.path(), "below").with_min_vert_id(10).build::<Type2Edge>(&below).is_err());
    }

    #[test]
    fn test_build_rejects_out_of_range_edge() {
        let dir = tempfile::tempdir().unwrap();
        let list = EdgeList::new(2, &[(0, 2)]);
        assert!(GraphBuilder::new(dir.path(), "bad").build::<Type2Edge>(&list).is_err());
    }

    #[test]
    fn test_read_edge_list_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.txt");
        fs::write(&path, "# comment\n0 1\n\n1 4 2.5\n").unwrap();
        let list = read_edge_list(&path).unwrap();
        assert_eq!(list.vertex_count, 5);
        assert_eq!(list.edges, vec![(0, 1, 1.0), (1, 4, 2.5)]);

        fs::write(&path, "0 x\n").unwrap();
        assert!(matches!(read_edge_list(&path), Err(EngineError::Format { .. })));
    }
}
