mod agent;
mod dataset;
mod errors;
mod instruction;
mod query;
mod relevance;
mod routes;
mod run;
pub mod sandbox;
mod schema;
mod tool;
mod tools;

pub use agent::{Agent, AgentParams};
pub use dataset::{CellValue, Dataset, DatasetError, DatasetStore, LoadedDataset};
pub use errors::{AgentError, BoxedError};
pub use instruction::InstructionParam;
pub use query::{
    run_query, QueryResponse, NO_DATASET_MESSAGE, PARSE_FAILURE_MESSAGE, TIMEOUT_MESSAGE,
    UNANSWERABLE_MESSAGE,
};
pub use relevance::{check_relevance, Relevance};
pub use routes::{app, AppState, QueryRequest};
pub use run::{AgentRequest, AgentResponse, RunSession, RunState};
pub use schema::{infer_schema, schema_description, schema_outline, ColumnSchema, ColumnType, Schema};
pub use tool::{AgentTool, AgentToolResult};
pub use tools::{GenerateChartTool, QueryContext, RunCodeTool};
