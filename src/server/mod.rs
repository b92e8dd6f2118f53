pub mod api;

use crate::cli::ServeArgs;
use crate::relay::ChatRelay;
use std::error::Error;

pub struct Server {
    addr: String,
    relay: ChatRelay,
    args: ServeArgs,
}

impl Server {
    pub fn new(addr: String, relay: ChatRelay, args: ServeArgs) -> Self {
        Self {
            addr,
            relay,
            args,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(&self.addr, self.relay.clone(), &self.args).await
    }
}
