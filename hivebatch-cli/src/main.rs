//! Command line program for generating, running and processing swarm
//! simulation experiment batches.

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;

extern crate anyhow;
extern crate clap;
extern crate colored;

extern crate hivebatch_core as hivebatch;

pub mod cli;
mod inspect;

use colored::*;

fn main() {
    match cli::start(cli::app_matches()) {
        Ok(_) => (),
        Err(e) => {
            println!("{}{}", "error: ".red(), e);
            if e.root_cause().to_string() != e.to_string() {
                println!("Caused by:\n{}", e.root_cause())
            }
            std::process::exit(1);
        }
    }
}
