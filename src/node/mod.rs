pub mod dspar_node;
pub mod lifecycle;
pub mod node_configuration;
pub mod reorder_buffer;
pub mod run_report;
