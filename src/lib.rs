pub mod config;
pub mod error;
pub mod node;
pub mod protocol;
pub mod serializer;
pub mod skeleton;
pub mod stage;
pub mod test_util;
pub mod transport;
pub mod util;


#[cfg(test)]
mod test {
    use tracing::Level;

    #[ctor::ctor]
    fn init_test_logging() {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(Level::DEBUG)
            .try_init()
            .ok();
    }
}
