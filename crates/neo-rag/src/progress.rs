use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar for `len` units, or a hidden one when disabled.
pub(crate) fn bar(len: u64, enabled: bool, unit: &str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    let template = format!(
        "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{eta}})",
        unit
    );
    if let Ok(style) = ProgressStyle::default_bar().template(&template) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
