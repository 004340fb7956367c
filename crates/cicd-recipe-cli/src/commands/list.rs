//! List command.

use anyhow::Result;
use cicd_recipe_core::App;

pub fn run() -> Result<()> {
    for line in render(&App::recipe())? {
        println!("{}", line);
    }
    Ok(())
}

/// One line per stack in deployment order.
fn render(app: &App) -> Result<Vec<String>> {
    Ok(app
        .deployment_order()?
        .iter()
        .map(|stack| {
            let deps = stack.dependencies();
            if deps.is_empty() {
                stack.name().to_string()
            } else {
                format!("{} (depends on: {})", stack.name(), deps.join(", "))
            }
        })
        .collect())
}
