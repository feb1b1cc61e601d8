use armorgen::{
    cli::{Args, run},
    error::ArmorError,
};
use clap::Parser;

fn main() -> Result<(), ArmorError> {
    env_logger::init();

    let args = Args::parse();
    run(&args)
}
