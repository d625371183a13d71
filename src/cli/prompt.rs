use anyhow::Result;

use dermalens::analysis::PromptBuilder;

pub fn run() -> Result<()> {
    println!("{}", PromptBuilder.build());
    Ok(())
}
