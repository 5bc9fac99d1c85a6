//! Indentation-aware builder for nginx directive text.

/// Accumulates directive lines with four-space indentation per block level.
#[derive(Debug, Default)]
pub struct ConfigWriter {
    out: String,
    depth: usize,
}

impl ConfigWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-line comment; newlines in `text` are flattened.
    pub fn comment(&mut self, text: &str) {
        let flat = text.replace(['\n', '\r'], " ");
        self.line(&format!("# {}", flat));
    }

    pub fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// `name value;`
    pub fn directive(&mut self, name: &str, value: &str) {
        self.line(&format!("{} {};", name, value));
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    /// Opens `header {` and increases the indentation.
    pub fn open(&mut self, header: &str) {
        self.line(&format!("{} {{", header));
        self.depth += 1;
    }

    pub fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    /// Appends `text` untouched, terminated by a newline.
    pub fn raw(&mut self, text: &str) {
        self.out.push_str(text);
        if !text.ends_with('\n') {
            self.out.push('\n');
        }
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_blocks() {
        let mut w = ConfigWriter::new();
        w.open("server");
        w.directive("listen", "80");
        w.open("location /");
        w.directive("return", "204");
        w.close();
        w.close();
        assert_eq!(
            w.finish(),
            "server {\n    listen 80;\n    location / {\n        return 204;\n    }\n}\n"
        );
    }

    #[test]
    fn test_raw_is_not_indented() {
        let mut w = ConfigWriter::new();
        w.open("server");
        w.raw("  gzip on;");
        w.close();
        assert_eq!(w.finish(), "server {\n  gzip on;\n}\n");
    }
}
