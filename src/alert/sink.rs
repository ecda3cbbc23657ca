use std::process::{Child, Command, Stdio};

use super::AlertEvent;

/// Fire-and-forget alert target. Called once per accepted detection, so
/// implementations must return without waiting on slow work.
pub trait AlertSink: Send {
    fn trigger(&mut self, event: &AlertEvent);
}

pub struct LogSink;

impl AlertSink for LogSink {
    fn trigger(&mut self, event: &AlertEvent) {
        tracing::warn!(
            id = event.id,
            frame = event.frame,
            x = event.x,
            y = event.y,
            width = event.width,
            height = event.height,
            speed = format!("{:.2}", event.speed),
            "fast object in zone"
        );
    }
}

/// Spawns an external command per alert, e.g. a sound player.
pub struct CommandSink {
    program: String,
    args: Vec<String>,
    children: Vec<Child>,
}

impl CommandSink {
    /// `None` for an empty command line.
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            children: Vec::new(),
        })
    }

    pub fn running(&self) -> usize {
        self.children.len()
    }

    fn reap(&mut self) {
        self.children
            .retain_mut(|child| matches!(child.try_wait(), Ok(None)));
    }
}

impl AlertSink for CommandSink {
    fn trigger(&mut self, event: &AlertEvent) {
        self.reap();

        match Command::new(&self.program)
            .args(&self.args)
            .env("ALERT_SPEED", format!("{:.2}", event.speed))
            .env("ALERT_X", event.x.to_string())
            .env("ALERT_Y", event.y.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => self.children.push(child),
            Err(e) => {
                tracing::error!(program = %self.program, error = %e, "failed to run alert command");
            }
        }
    }
}

impl Drop for CommandSink {
    fn drop(&mut self) {
        for mut child in self.children.drain(..) {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
