use crate::compose::Rendered;
use crate::value::Value;

/// One element of the flat event stream traversal feeds the printer, in
/// document order.
#[derive(Debug)]
pub(crate) enum Event {
    Open {
        tag: String,
        attrs: Rendered,
        body_allowed: bool,
        /// Structural nodes contribute no markup, only boundary
        /// tracking, unless debug mode makes them visible.
        structural: bool,
    },
    Text(String),
    Close,
}

struct Frame {
    close_tag: Option<String>,
    visible: bool,
}

/// Renders the event stream into indented markup, tracking a
/// pending-close-tag stack.
pub(crate) struct Printer {
    out: String,
    indent: usize,
    debug: bool,
    level: usize,
    stack: Vec<Frame>,
}

impl Printer {
    pub(crate) fn new(indent: usize, debug: bool) -> Self {
        Self {
            out: String::new(),
            indent,
            debug,
            level: 0,
            stack: Vec::new(),
        }
    }

    pub(crate) fn doctype(&mut self, doctype: &str) {
        let line = format!("<!DOCTYPE {}>", doctype);
        self.write_line(&line);
    }

    pub(crate) fn handle(&mut self, event: Event) {
        match event {
            Event::Open {
                tag,
                attrs,
                body_allowed,
                structural,
            } => {
                let visible = !structural || self.debug;
                if visible {
                    let mut line = format!("<{}", tag);
                    push_attrs(&mut line, &attrs);
                    if body_allowed {
                        line.push('>');
                    } else {
                        line.push_str("/>");
                    }
                    self.write_line(&line);
                }
                self.stack.push(Frame {
                    close_tag: (visible && body_allowed).then(|| format!("</{}>", tag)),
                    visible,
                });
                if visible {
                    self.level += 1;
                }
            }
            Event::Text(text) => self.write_line(&text),
            Event::Close => {
                if let Some(frame) = self.stack.pop() {
                    if frame.visible {
                        self.level -= 1;
                    }
                    if let Some(close_tag) = frame.close_tag {
                        self.write_line(&close_tag);
                    }
                }
            }
        }
    }

    fn write_line(&mut self, text: &str) {
        if self.indent == 0 {
            self.out.push_str(text);
        } else {
            for _ in 0..self.level * self.indent {
                self.out.push(' ');
            }
            self.out.push_str(text);
            self.out.push('\n');
        }
    }

    pub(crate) fn take(&mut self) -> String {
        std::mem::take(&mut self.out)
    }
}

/// Serializes an attribute map: `true` booleans render bare, `false`
/// and `Null` values are omitted entirely.
fn push_attrs(line: &mut String, attrs: &Rendered) {
    for (name, value) in attrs {
        match value {
            Value::Bool(true) => {
                line.push(' ');
                line.push_str(name);
            }
            Value::Bool(false) | Value::Null => {}
            other => {
                line.push(' ');
                line.push_str(name);
                line.push_str("=\"");
                line.push_str(&other.to_text());
                line.push('"');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(tag: &str, structural: bool) -> Event {
        Event::Open {
            tag: tag.to_string(),
            attrs: Rendered::new(),
            body_allowed: true,
            structural,
        }
    }

    #[test]
    fn nested_tags_indent_per_level() {
        let mut printer = Printer::new(2, false);
        printer.handle(open("html", false));
        printer.handle(open("body", false));
        printer.handle(Event::Text("hi".to_string()));
        printer.handle(Event::Close);
        printer.handle(Event::Close);
        assert_eq!(
            printer.take(),
            "<html>\n  <body>\n    hi\n  </body>\n</html>\n"
        );
    }

    #[test]
    fn zero_indent_adds_no_whitespace() {
        let mut printer = Printer::new(0, false);
        printer.handle(open("div", false));
        printer.handle(Event::Text("x".to_string()));
        printer.handle(Event::Close);
        assert_eq!(printer.take(), "<div>x</div>");
    }

    #[test]
    fn structural_frames_do_not_indent_descendants() {
        let mut printer = Printer::new(2, false);
        printer.handle(open("wrapper-component", true));
        printer.handle(open("div", false));
        printer.handle(Event::Close);
        printer.handle(Event::Close);
        assert_eq!(printer.take(), "<div>\n</div>\n");
    }

    #[test]
    fn debug_mode_makes_structural_frames_visible() {
        let mut printer = Printer::new(2, true);
        printer.handle(open("Card", true));
        printer.handle(open("div", false));
        printer.handle(Event::Close);
        printer.handle(Event::Close);
        assert_eq!(printer.take(), "<Card>\n  <div>\n  </div>\n</Card>\n");
    }

    #[test]
    fn void_tags_self_close_and_boolean_attrs_render_bare() {
        let mut attrs = Rendered::new();
        attrs.insert("charset".to_string(), Value::from("utf-8"));
        attrs.insert("hidden".to_string(), Value::Bool(true));
        attrs.insert("disabled".to_string(), Value::Bool(false));
        attrs.insert("title".to_string(), Value::Null);

        let mut printer = Printer::new(2, false);
        printer.handle(Event::Open {
            tag: "meta".to_string(),
            attrs,
            body_allowed: false,
            structural: false,
        });
        printer.handle(Event::Close);
        assert_eq!(printer.take(), "<meta charset=\"utf-8\" hidden/>\n");
    }

    #[test]
    fn doctype_prefixes_output() {
        let mut printer = Printer::new(2, false);
        printer.doctype("html");
        printer.handle(open("html", false));
        printer.handle(Event::Close);
        assert_eq!(printer.take(), "<!DOCTYPE html>\n<html>\n</html>\n");
    }
}
