//! Indentation-aware writer for Java-like text

use std::fmt::{Result, Write};

/// Writes curly-brace blocks, indenting each line by how many blocks are open
pub struct JavaWriter<W: Write> {
    /// How many blocks have been opened but not closed?
    open_blocks: usize,

    /// Is there a line already in progress?
    line_in_progress: bool,

    inner: W,
}

/// Automatically indents the start of every line written (braces in the text are not tracked)
impl<W: Write> Write for JavaWriter<W> {
    fn write_str(&mut self, text: &str) -> Result {
        for line in text.split_inclusive('\n') {
            if line != "\n" {
                self.ensure_line_indented()?;
            }
            self.inner.write_str(line)?;
            self.line_in_progress = !line.ends_with('\n');
        }
        Ok(())
    }
}

impl<W: Write> JavaWriter<W> {
    pub fn new(inner: W) -> JavaWriter<W> {
        JavaWriter {
            open_blocks: 0,
            line_in_progress: false,
            inner,
        }
    }

    fn ensure_line_indented(&mut self) -> Result {
        if !self.line_in_progress {
            for _ in 0..self.open_blocks {
                self.inner.write_str("    ")?;
            }
            self.line_in_progress = true;
        }
        Ok(())
    }

    /// Start a new line, unless the current one is empty
    pub fn end_line(&mut self) -> Result {
        if self.line_in_progress {
            self.inner.write_str("\n")?;
            self.line_in_progress = false;
        }
        Ok(())
    }

    /// Open a curly brace block, tacking ` {` onto the current line if there is one
    pub fn open_curly_block(&mut self) -> Result {
        if self.line_in_progress {
            self.write_str(" ")?;
        }
        self.write_str("{\n")?;
        self.open_blocks += 1;
        Ok(())
    }

    /// Close a curly brace block on a fresh line
    ///
    /// `continuation` is written after the brace on the same line (`else`, `while (x);`...).
    pub fn close_curly_block(&mut self, continuation: Option<&str>) -> Result {
        self.end_line()?;
        self.open_blocks = self.open_blocks.saturating_sub(1);
        match continuation {
            Some(text) => write!(self, "}} {}", text),
            None => self.write_str("}\n"),
        }
    }

    /// Temporarily step out of the current block (for `case` labels and block labels)
    pub fn outdented(&mut self, text: &str) -> Result {
        self.end_line()?;
        let open_blocks = self.open_blocks;
        self.open_blocks = open_blocks.saturating_sub(1);
        writeln!(self, "{}", text)?;
        self.open_blocks = open_blocks;
        Ok(())
    }

    /// Indent following lines one more level, without a brace
    pub fn indent(&mut self) {
        self.open_blocks += 1;
    }

    pub fn dedent(&mut self) {
        self.open_blocks = self.open_blocks.saturating_sub(1);
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pass_through() -> Result {
        let mut java_writer = JavaWriter::new(String::new());
        write!(&mut java_writer, "hello")?;
        write!(&mut java_writer, " world")?;
        writeln!(&mut java_writer, "!")?;
        assert_eq!(java_writer.into_inner(), "hello world!\n");
        Ok(())
    }

    #[test]
    fn nested_blocks() -> Result {
        let mut java_writer = JavaWriter::new(String::new());

        write!(&mut java_writer, "static void main(java.lang.String[] args)")?;
        java_writer.open_curly_block()?;
        write!(&mut java_writer, "if (flag)")?;
        java_writer.open_curly_block()?;
        writeln!(&mut java_writer, "a = 1;")?;
        java_writer.close_curly_block(Some("else"))?;
        java_writer.open_curly_block()?;
        write!(&mut java_writer, "a = 2;")?;
        java_writer.close_curly_block(None)?;
        java_writer.outdented("label0:")?;
        writeln!(&mut java_writer, "return;")?;
        java_writer.close_curly_block(None)?;

        assert_eq!(
            java_writer.into_inner(),
            "static void main(java.lang.String[] args) {
    if (flag) {
        a = 1;
    } else {
        a = 2;
    }
label0:
    return;
}
"
        );
        Ok(())
    }
}
