//! Line-oriented directive scanner.
//!
//! The [`Scanner`] consumes header-like text in order and recognizes
//! line-level directives via anchored patterns: class and bound-struct
//! openings, end-of-class markers, method/constructor signatures (with
//! `\` continuation), attribute declarations, constant macros, and comment
//! blocks. It maintains exactly one "current class" context and a pending
//! documentation buffer fed by comments immediately preceding a directive,
//! cleared after every line that is not itself a comment continuation.
//!
//! The scanner never aborts on malformed input: unknown type spellings are
//! logged and the offending argument or attribute is dropped downstream.

use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use pyglue_core::{ClassEntry, ClassKind, ConstantKind, ModuleBuilder};

lazy_static! {
    static ref CLASS_RE: Regex =
        Regex::new(r"^([A-Z]+)?\s*CLASS\(([A-Za-z0-9_]+)\s*,\s*([A-Za-z0-9_]*)\)").unwrap();
    static ref METHOD_RE: Regex =
        Regex::new(r"^\s*([0-9A-Za-z_ ]+\s+\*?)METHOD\(([A-Za-z0-9_]+),\s*([A-Za-z0-9_]+),?")
            .unwrap();
    static ref ARG_RE: Regex = Regex::new(r"^\s*([0-9A-Za-z_ ]+\s+\*?)([0-9A-Za-z_]+),?").unwrap();
    static ref CONSTANT_RE: Regex = Regex::new(r"#define\s+([A-Z0-9_]+)\s+\S+").unwrap();
    static ref STRUCT_RE: Regex =
        Regex::new(r"([A-Z]+)\s+typedef struct\s+([A-Za-z0-9_]+)\s+\{").unwrap();
    static ref END_CLASS_RE: Regex = Regex::new(r"END_CLASS").unwrap();
    static ref ATTRIBUTE_RE: Regex =
        Regex::new(r"^\s*([0-9A-Za-z_ ]+\s+\*?)\s*([A-Za-z_]+)\s*;").unwrap();
    static ref COMMENT_RE: Regex = Regex::new(r"^\s*//").unwrap();
    static ref COMMENT_START_RE: Regex = Regex::new(r"/\*+").unwrap();
    static ref COMMENT_END_RE: Regex = Regex::new(r"\*+/").unwrap();
}

/// Errors raised while reading input files.
#[derive(Debug, Error)]
pub enum ScanError {
    /// An input header could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The file that failed.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Directive scanner driving a [`ModuleBuilder`].
pub struct Scanner {
    builder: ModuleBuilder,
    current_class: Option<String>,
    current_comment: String,
}

impl Scanner {
    /// Create a scanner feeding the given builder.
    pub fn new(builder: ModuleBuilder) -> Self {
        Self {
            builder,
            current_class: None,
            current_comment: String::new(),
        }
    }

    /// Access the builder mid-scan (mainly for tests and inspection).
    pub fn builder(&self) -> &ModuleBuilder {
        &self.builder
    }

    /// Finish scanning and hand the builder back for freezing.
    pub fn into_builder(self) -> ModuleBuilder {
        self.builder
    }

    /// Scan one header file, recording it in the module's include list.
    pub fn scan_file(&mut self, path: &Path) -> Result<(), ScanError> {
        let text = fs::read_to_string(path).map_err(|source| ScanError::Read {
            path: path.display().to_string(),
            source,
        })?;
        self.builder.add_include(&path.display().to_string());
        self.scan(&text);
        Ok(())
    }

    /// Scan header text under a virtual include name.
    pub fn scan_source(&mut self, include_name: &str, text: &str) {
        self.builder.add_include(include_name);
        self.scan(text);
    }

    /// Scan header text.
    pub fn scan(&mut self, text: &str) {
        let lines: Vec<&str> = text.lines().collect();
        let mut i = 0;

        while i < lines.len() {
            let mut line = lines[i].to_string();
            i += 1;

            // A run of // comments becomes the pending documentation; the
            // first non-comment line falls through to directive matching.
            let comment_end = COMMENT_RE.find(&line).map(|m| m.end());
            if let Some(end) = comment_end {
                self.current_comment = line[end..].to_string();
                self.current_comment.push('\n');
                loop {
                    if i >= lines.len() {
                        line.clear();
                        break;
                    }
                    let next = lines[i];
                    i += 1;
                    match COMMENT_RE.find(next).map(|m| m.end()) {
                        Some(end) => {
                            self.current_comment.push_str(&next[end..]);
                            self.current_comment.push('\n');
                        }
                        None => {
                            line = next.to_string();
                            break;
                        }
                    }
                }
            }

            // Block comments accumulate until the closing marker; the text
            // after the close is discarded and scanning resumes on the next
            // line.
            let block_start = COMMENT_START_RE.find(&line).map(|m| m.end());
            if let Some(start) = block_start {
                let mut rest = line[start..].to_string();
                loop {
                    let close = COMMENT_END_RE.find(&rest).map(|m| m.start());
                    if let Some(close) = close {
                        self.current_comment.push_str(&rest[..close]);
                        if i < lines.len() {
                            line = lines[i].to_string();
                            i += 1;
                        } else {
                            line.clear();
                        }
                        break;
                    }
                    self.current_comment.push_str(&rest);
                    self.current_comment.push('\n');
                    if i >= lines.len() {
                        line.clear();
                        break;
                    }
                    rest = lines[i].to_string();
                    i += 1;
                }
            }

            if let Some(captures) = CONSTANT_RE.captures(&line) {
                let kind = if line.contains('"') {
                    ConstantKind::Str
                } else {
                    ConstantKind::Numeric
                };
                self.builder.add_constant(&captures[1], kind);
            }

            // Bound structs: only structures explicitly marked are wrapped.
            if let Some(captures) = STRUCT_RE.captures(&line) {
                let modifier = captures[1].to_string();
                let name = captures[2].to_string();
                if modifier.contains("BOUND") {
                    self.add_class(&name, None, ClassKind::BoundStruct, modifier);
                }
                self.current_comment.clear();
                continue;
            }

            if let Some(captures) = CLASS_RE.captures(&line) {
                let modifier = captures
                    .get(1)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                let name = captures[2].to_string();
                let base = match &captures[3] {
                    "" => None,
                    base => Some(base.to_string()),
                };
                self.add_class(&name, base, ClassKind::Object, modifier);
                self.current_comment.clear();
                continue;
            }

            if self.current_class.is_some() {
                if let Some(captures) = METHOD_RE.captures(&line) {
                    let return_type = captures[1].trim().to_string();
                    let method_name = captures[3].to_string();
                    let mut offset = captures.get(0).map(|m| m.end()).unwrap_or(0);
                    let mut signature = line.clone();
                    let mut args: Vec<(String, String)> = Vec::new();

                    loop {
                        let arg = ARG_RE.captures(&signature[offset..]).map(|arg| {
                            (
                                arg.get(0).map(|m| m.end()).unwrap_or(0),
                                arg[1].trim().to_string(),
                                arg[2].trim().to_string(),
                            )
                        });
                        match arg {
                            Some((consumed, spelling, name)) => {
                                offset += consumed;
                                args.push((spelling, name));
                            }
                            // Signatures continue across lines ending in \.
                            None if signature.trim_end().ends_with('\\') && i < lines.len() => {
                                signature = lines[i].to_string();
                                i += 1;
                                offset = 0;
                            }
                            None => break,
                        }
                    }

                    let class_name = self.current_class.clone().unwrap_or_default();
                    let is_constructor = return_type == class_name
                        && self
                            .builder
                            .class(&class_name)
                            .is_some_and(|c| c.constructor.is_none());
                    self.builder.add_method(
                        &class_name,
                        &method_name,
                        &args,
                        &return_type,
                        &self.current_comment,
                        is_constructor,
                    );
                }

                if let Some(captures) = ATTRIBUTE_RE.captures(&line) {
                    let spelling = captures[1].to_string();
                    let name = captures[2].to_string();
                    let class_name = self.current_class.clone().unwrap_or_default();
                    self.builder.add_attribute(&class_name, &name, &spelling);
                }
            }

            if END_CLASS_RE.is_match(&line) {
                self.current_class = None;
            }

            // Comments only document the directive immediately after them.
            self.current_comment.clear();
        }
    }

    /// Open a class context, cloning an already-known base class's model.
    ///
    /// The base is a name reference only: an empty or unknown base name
    /// yields a fresh, non-derived model.
    fn add_class(&mut self, name: &str, base: Option<String>, kind: ClassKind, modifier: String) {
        let cloned = base
            .as_deref()
            .and_then(|b| self.builder.class(b))
            .map(|base_entry| base_entry.clone_as(name));
        let mut entry = match cloned {
            Some(entry) => entry,
            None => {
                if let Some(base) = base.as_deref() {
                    log::warn!("base class {base} is not defined");
                }
                match kind {
                    ClassKind::Object => ClassEntry::new_object(name, base),
                    ClassKind::BoundStruct => ClassEntry::new_struct(name),
                }
            }
        };
        entry.docstring = self.current_comment.clone();
        entry.modifier = modifier;
        self.builder.add_class(entry);
        self.current_class = Some(name.to_string());
    }
}
