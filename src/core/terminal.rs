use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✔", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("✖", "");

// ── Box-drawing constants ──────────────────────────────────────────────────
const BOX_WIDTH: usize = 72;
const BOX_H: &str = "─";
const BOX_V: &str = "│";
const BOX_BL: &str = "└";
const BOX_DIAMOND: &str = "◇";

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_banner() {
    println!();
    println!(" {}", style("dispatchd").cyan().bold());
    println!(
        " {}",
        style("execution broker for command-line agents").dim()
    );
}

fn guide_bar() {
    println!(" {}", style(BOX_V).dim());
}

fn close_section() {
    let bar = BOX_H.repeat(BOX_WIDTH);
    println!(" {}{}", style(BOX_BL).dim(), style(&bar).dim());
}

/// A builder for rendering a bordered section like:
/// ```text
/// ◇ Title ──────────────────────────────────────
/// │
/// │  Content lines go here.
/// │
/// └─────────────────────────────────────────────
/// ```
pub struct GuideSection {
    title: String,
    lines: Vec<GuideLine>,
}

enum GuideLine {
    Text(String),
    Blank,
    Info(String),
    Command(String, String),
    Status(String, String),
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(GuideLine::Text(text.to_string()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(GuideLine::Blank);
        self
    }

    pub fn info(mut self, text: &str) -> Self {
        self.lines.push(GuideLine::Info(text.to_string()));
        self
    }

    pub fn command(mut self, cmd: &str, desc: &str) -> Self {
        self.lines
            .push(GuideLine::Command(cmd.to_string(), desc.to_string()));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.lines
            .push(GuideLine::Status(label.to_string(), value.to_string()));
        self
    }

    /// Render the full bordered section.
    pub fn print(&self) {
        let v = style(BOX_V).dim();

        let title_display = format!(" {} ", self.title);
        let title_width = console::measure_text_width(&title_display);
        let remaining = if BOX_WIDTH > title_width + 3 {
            BOX_WIDTH - title_width - 3
        } else {
            4
        };
        println!();
        println!(
            " {} {}{}",
            style(BOX_DIAMOND).cyan(),
            style(&title_display).bold(),
            style(BOX_H.repeat(remaining)).dim(),
        );
        println!(" {}", v);

        for line in &self.lines {
            match line {
                GuideLine::Blank => println!(" {}", v),
                GuideLine::Text(t) => println!(" {}  {}", v, style(t).dim()),
                GuideLine::Info(t) => {
                    println!(" {}  {} {}", v, INFO_ICON, style(t).blue())
                }
                GuideLine::Command(cmd, desc) => {
                    println!(
                        " {}  {:<24} {}",
                        v,
                        style(cmd).cyan().bold(),
                        style(desc).dim()
                    );
                }
                GuideLine::Status(label, value) => {
                    println!(" {}  {:<16} {}", v, style(label).bold(), value);
                }
            }
        }

        guide_bar();
        close_section();
    }
}
