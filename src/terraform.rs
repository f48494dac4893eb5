pub mod command;
pub mod executor;
pub mod schema;
pub mod state;

pub use command::{CommandError, CommandOutput, CommandRunner};
pub use executor::{CliTerraformExecutor, TerraformExecutor};
pub use schema::{NestedBlock, ProviderSchema, SchemaAttribute, SchemaBlock};
pub use state::{StateDocument, StateFormat, parse_state_file};
