//! Streaming JSON writer.
//!
//! A minimal emitter with explicit open/close of arrays and objects. The
//! writer tracks a stack of container states and takes care of commas,
//! newlines, and indentation. Misuse - unbalanced open/close, a value
//! where a key is due, more than one top-level value - is a bug in the
//! caller and panics; I/O errors propagate.

use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerKind {
    TopLevel,
    Array,
    Object,
}

#[derive(Debug)]
struct ContainerState {
    kind: ContainerKind,
    num_elements: usize,
    level: usize,
}

/// A streaming JSON emitter.
///
/// `indent = 0` selects compact output: no newlines and no indentation,
/// but still a single space after each ':' to aid human inspection.
pub struct JsonWriter<W: Write> {
    out: W,
    indent: usize,
    stack: Vec<ContainerState>,
}

impl<W: Write> JsonWriter<W> {
    /// Creates a writer emitting to `out` with the given indent width.
    pub fn new(out: W, indent: usize) -> Self {
        Self {
            out,
            indent,
            stack: vec![ContainerState {
                kind: ContainerKind::TopLevel,
                num_elements: 0,
                level: 0,
            }],
        }
    }

    /// Opens an array.
    pub fn open_array(&mut self) -> io::Result<()> {
        self.open_container(ContainerKind::Array, b"[")
    }

    /// Closes the innermost array.
    pub fn close_array(&mut self) -> io::Result<()> {
        self.close_container(ContainerKind::Array, b"]")
    }

    /// Opens an object.
    pub fn open_object(&mut self) -> io::Result<()> {
        self.open_container(ContainerKind::Object, b"{")
    }

    /// Closes the innermost object.
    pub fn close_object(&mut self) -> io::Result<()> {
        if self.current().kind == ContainerKind::Object && self.current().num_elements % 2 == 1 {
            panic!("json writer: expected a value before closing the object");
        }
        self.close_container(ContainerKind::Object, b"}")
    }

    /// Emits an object member key.
    pub fn member_key(&mut self, key: &str) -> io::Result<()> {
        if self.current().kind != ContainerKind::Object {
            panic!("json writer: member key outside an object");
        }
        if self.current().num_elements % 2 == 1 {
            panic!("json writer: member key where a value is due");
        }
        self.pre_item(false, true)?;
        self.write_string(key)?;
        self.out.write_all(b":")
    }

    /// Emits a string value.
    pub fn scalar_str(&mut self, value: &str) -> io::Result<()> {
        self.pre_item(false, false)?;
        self.write_string(value)
    }

    /// Emits an unsigned integer value.
    pub fn scalar_u64(&mut self, value: u64) -> io::Result<()> {
        self.pre_item(false, false)?;
        write!(self.out, "{value}")
    }

    /// Emits a boolean value.
    pub fn scalar_bool(&mut self, value: bool) -> io::Result<()> {
        self.pre_item(false, false)?;
        self.out.write_all(if value { b"true" } else { b"false" })
    }

    /// Emits a null value.
    pub fn null(&mut self) -> io::Result<()> {
        self.pre_item(false, false)?;
        self.out.write_all(b"null")
    }

    /// Finishes the document: checks every container was closed and that
    /// one value was written, and emits the trailing newline in pretty
    /// mode.
    pub fn end(mut self) -> io::Result<()> {
        if self.indent > 0 {
            self.out.write_all(b"\n")?;
        }
        if self.stack.len() != 1 {
            panic!(
                "json writer: {} unclosed array(s) or object(s)",
                self.stack.len() - 1
            );
        }
        if self.current().num_elements == 0 {
            panic!("json writer: no value written");
        }
        self.out.flush()
    }

    fn current(&self) -> &ContainerState {
        self.stack.last().expect("container stack is never empty")
    }

    fn open_container(&mut self, kind: ContainerKind, delim: &[u8]) -> io::Result<()> {
        self.pre_item(false, false)?;
        self.out.write_all(delim)?;
        let level = self.current().level + 1;
        self.stack.push(ContainerState {
            kind,
            num_elements: 0,
            level,
        });
        Ok(())
    }

    fn close_container(&mut self, kind: ContainerKind, delim: &[u8]) -> io::Result<()> {
        if self.current().kind != kind {
            panic!("json writer: mismatched container close");
        }
        if self.stack.len() == 1 {
            panic!("json writer: close without a matching open");
        }
        self.pre_item(true, false)?;
        self.out.write_all(delim)?;
        self.stack.pop();
        Ok(())
    }

    /// Emits the punctuation owed before an item: the separating comma,
    /// the newline and indentation in pretty mode, and the space between
    /// a key and its value.
    fn pre_item(&mut self, closing: bool, is_key: bool) -> io::Result<()> {
        let kind = self.current().kind;
        let num_elements = self.current().num_elements;

        if !closing {
            if !is_key {
                if kind == ContainerKind::TopLevel && num_elements != 0 {
                    panic!("json writer: only one top-level value allowed");
                }
                if kind == ContainerKind::Object && num_elements % 2 == 0 {
                    panic!("json writer: expected a member key");
                }
            }
            self.stack
                .last_mut()
                .expect("container stack is never empty")
                .num_elements += 1;
        }

        match kind {
            ContainerKind::Array | ContainerKind::Object => {
                if num_elements == 0 && closing {
                    return Ok(());
                }
                if kind == ContainerKind::Object && num_elements % 2 == 1 {
                    // Value position right after its key.
                    return self.out.write_all(b" ");
                }
                if num_elements > 0 && !closing {
                    self.out.write_all(b",")?;
                }
            }
            ContainerKind::TopLevel => {}
        }

        if self.indent != 0 && kind != ContainerKind::TopLevel {
            self.out.write_all(b"\n")?;
            let mut level = self.current().level;
            if closing && level > 0 {
                level -= 1;
            }
            for _ in 0..level * self.indent {
                self.out.write_all(b" ")?;
            }
        }
        Ok(())
    }

    /// Writes a quoted string, escaping '"', '\\', and newline.
    fn write_string(&mut self, s: &str) -> io::Result<()> {
        self.out.write_all(b"\"")?;
        for b in s.bytes() {
            match b {
                b'\n' => self.out.write_all(b"\\n")?,
                b'"' => self.out.write_all(b"\\\"")?,
                b'\\' => self.out.write_all(b"\\\\")?,
                _ => self.out.write_all(&[b])?,
            }
        }
        self.out.write_all(b"\"")
    }
}
