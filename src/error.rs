use std::process::ExitStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("a node with id '{id}' already exists in the graph")]
    DuplicateNode { id: String },

    #[error("an edge with id '{id}' already exists in the graph")]
    DuplicateEdge { id: String },

    #[error("edge '{edge_id}' references node '{node_id}' which is not in the graph")]
    DanglingEndpoint { edge_id: String, node_id: String },

    #[error("layout output is not a graph description: {output}")]
    LayoutOutput { output: String },

    #[error("failed to run layout program '{program}'")]
    LayoutOracle {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("layout program '{program}' exited with {status}: {stderr}")]
    OracleFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Format(#[from] std::fmt::Error),
}
