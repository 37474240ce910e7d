use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Capacity of the buffered readers and writers used when streaming graph files.
pub const READ_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Default number of vertex slots per attribute segment.
pub const DEFAULT_SEGMENT_CAP: u32 = 1 << 16;

/// Edge record layout, selected once per run from the graph description.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    /// `{dest: u32}`
    Type1,
    /// `{dest: u32, weight: f32}`
    Type2,
}

/// Graph description: the id range, edge count and the binary files of one graph.
///
/// Stored as YAML next to the binary files. Relative file names are resolved against the
/// directory holding the description, so a description and its files can be moved together.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GraphDesc {
    pub min_vert_id: u32,
    pub max_vert_id: u32,
    pub num_edges: u64,
    pub edge_type: EdgeType,
    pub vert_file: PathBuf,
    pub edge_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_vert_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_edge_file: Option<PathBuf>,
}

impl GraphDesc {
    /// Loads a description and resolves every file name to a usable path.
    ///
    /// # Arguments
    /// * `desc_path` - Path of the YAML description file.
    ///
    /// # Returns
    /// The description with absolute (or caller-relative) file paths.
    pub fn load(desc_path: &Path) -> Result<Self> {
        let text = fs::read_to_string(desc_path).map_err(|e| EngineError::io(desc_path, e))?;
        let mut desc: GraphDesc = serde_yaml::from_str(&text).map_err(|e| EngineError::Serde {
            path: desc_path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if desc.max_vert_id < desc.min_vert_id {
            return Err(EngineError::Config(format!(
                "{}: max_vert_id {} is below min_vert_id {}",
                desc_path.display(),
                desc.max_vert_id,
                desc.min_vert_id
            )));
        }
        if desc.in_vert_file.is_some() != desc.in_edge_file.is_some() {
            return Err(EngineError::Config(format!(
                "{}: in_vert_file and in_edge_file must be given together",
                desc_path.display()
            )));
        }

        let base = desc_path.parent().unwrap_or_else(|| Path::new("."));
        desc.vert_file = base.join(&desc.vert_file);
        desc.edge_file = base.join(&desc.edge_file);
        desc.in_vert_file = desc.in_vert_file.map(|p| base.join(p));
        desc.in_edge_file = desc.in_edge_file.map(|p| base.join(p));
        Ok(desc)
    }

    /// Writes the description, storing file names relative to `desc_path`'s directory
    /// whenever the files live in that directory.
    pub fn save(&self, desc_path: &Path) -> Result<()> {
        let base = desc_path.parent().unwrap_or_else(|| Path::new("."));
        let relative = |p: &Path| -> PathBuf {
            p.strip_prefix(base).map(Path::to_path_buf).unwrap_or_else(|_| p.to_path_buf())
        };
        let stored = GraphDesc {
            vert_file: relative(&self.vert_file),
            edge_file: relative(&self.edge_file),
            in_vert_file: self.in_vert_file.as_deref().map(relative),
            in_edge_file: self.in_edge_file.as_deref().map(relative),
            ..self.clone()
        };
        let text = serde_yaml::to_string(&stored).map_err(|e| EngineError::Serde {
            path: desc_path.to_path_buf(),
            reason: e.to_string(),
        })?;
        fs::write(desc_path, text).map_err(|e| EngineError::io(desc_path, e))
    }

    /// Number of vertex ids covered by the description.
    pub fn vertex_count(&self) -> usize {
        (self.max_vert_id - self.min_vert_id) as usize + 1
    }

    pub fn has_in_edges(&self) -> bool {
        self.in_vert_file.is_some() && self.in_edge_file.is_some()
    }
}

fn default_thread_num() -> usize {
    4
}

fn default_segment_cap() -> u32 {
    DEFAULT_SEGMENT_CAP
}

fn default_workspace() -> PathBuf {
    PathBuf::from("outcore.db")
}

fn default_in_mem_vertices() -> usize {
    1 << 20
}

fn default_message_buffer_cap() -> usize {
    1 << 24
}

/// Engine configuration, passed explicitly into every engine and pipeline.
///
/// # Fields
/// * `thread_num` - Worker threads of the per-iteration pool
/// * `segment_cap` - Vertex slots per attribute segment
/// * `workspace` - Directory receiving attribute, bag, remap and result files
/// * `in_mem_vertices` - Tasks at or below this size take the in-memory SCC route
/// * `message_buffer_cap` - Scatter/gather messages held in memory before spilling to disk
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_thread_num")]
    pub thread_num: usize,
    #[serde(default = "default_segment_cap")]
    pub segment_cap: u32,
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
    #[serde(default = "default_in_mem_vertices")]
    pub in_mem_vertices: usize,
    #[serde(default = "default_message_buffer_cap")]
    pub message_buffer_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_num: default_thread_num(),
            segment_cap: default_segment_cap(),
            workspace: default_workspace(),
            in_mem_vertices: default_in_mem_vertices(),
            message_buffer_cap: default_message_buffer_cap(),
        }
    }
}

impl EngineConfig {
    /// Reads a YAML configuration file; missing keys fall back to their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        let config: EngineConfig = serde_yaml::from_str(&text).map_err(|e| EngineError::Serde {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.thread_num == 0 {
            return Err(EngineError::Config("thread_num must be positive".to_owned()));
        }
        if self.segment_cap == 0 {
            return Err(EngineError::Config("segment_cap must be positive".to_owned()));
        }
        Ok(())
    }

    /// Creates the workspace directory if it does not exist yet.
    pub fn ensure_workspace(&self) -> Result<()> {
        fs::create_dir_all(&self.workspace).map_err(|e| EngineError::io(&self.workspace, e))
    }
}
