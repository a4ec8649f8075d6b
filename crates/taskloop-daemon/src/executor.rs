//! Default payload executor: hands the payload to `sh -c`.
//!
//! Failures are reported through the success flag, never raised: a non-zero
//! exit status or a spawn error both come back as `(detail, false)`.

use async_trait::async_trait;

use taskloop_pool::CodeExecutor;

pub struct ShellExecutor;

#[async_trait]
impl CodeExecutor for ShellExecutor {
    async fn run(&self, payload: &str) -> (String, bool) {
        match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(payload)
            .output()
            .await
        {
            Ok(out) => {
                let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
                if !out.status.success() {
                    let stderr = String::from_utf8_lossy(&out.stderr);
                    if !stderr.is_empty() {
                        if !text.is_empty() {
                            text.push('\n');
                        }
                        text.push_str(stderr.trim_end());
                    }
                }
                (text, out.status.success())
            }
            Err(e) => (format!("failed to spawn shell: {e}"), false),
        }
    }
}
