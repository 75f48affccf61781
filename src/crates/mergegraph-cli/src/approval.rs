//! Terminal yes/no prompts for interactive gates

use async_trait::async_trait;
use dialoguer::Confirm;
use mergegraph_core::ApprovalProvider;
use tracing::warn;

/// Asks the operator on the terminal; anything but an explicit yes declines
#[derive(Debug, Clone, Copy, Default)]
pub struct DialoguerApprover;

#[async_trait]
impl ApprovalProvider for DialoguerApprover {
    async fn ask_yes_no(&self, prompt: &str) -> bool {
        let prompt = prompt.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            Confirm::new().with_prompt(prompt).default(false).interact()
        })
        .await;

        match answer {
            Ok(Ok(approved)) => approved,
            Ok(Err(e)) => {
                warn!(error = %e, "Approval prompt failed; declining");
                false
            }
            Err(e) => {
                warn!(error = %e, "Approval prompt task panicked; declining");
                false
            }
        }
    }
}
