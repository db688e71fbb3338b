pub(crate) use tokio::time::sleep;
