use anyhow::Result;

fn main() -> Result<()> {
    greenbox::cli::run()
}
