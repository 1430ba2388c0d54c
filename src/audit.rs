//! トランザクション構築の記録
//!
//! 各プリイメージ・ダイジェスト・署名を人が読める行として残し、後から構築過程を
//! 再現できるようにする。記録は正しさには影響しない。

use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Default, Clone)]
pub struct AuditLog {
    lines: Vec<String>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, line: impl Into<String>) {
        let line = line.into();
        log::trace!("audit: {}", line);
        self.lines.push(line);
    }

    /// 空行
    pub fn blank(&mut self) {
        self.lines.push(String::new());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        for line in &self.lines {
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}
