use indicatif::{ProgressBar, ProgressStyle};

/// Creates a progress bar or spinner for a byte transfer.
///
/// # Arguments
/// * `file_size` - The size of the file in bytes.
/// * `offset` - An optional offset to start the progress bar from.
/// * `name` - The name of the file.
///
/// # Returns
/// A `ProgressBar` instance.
pub fn setup_progress_log(file_size: u64, offset: Option<u64>, name: &str) -> ProgressBar {
    if file_size == 0 {
        spinner(name)
    } else {
        progress_bar(file_size, offset, name)
    }
}

/// Creates a progress bar counting processed files of a batch.
///
/// Batches of a single file are not worth a bar, so a hidden one is
/// returned for them and whenever `enabled` is false.
pub fn setup_batch_progress(total: usize, enabled: bool) -> ProgressBar {
    if !enabled || total <= 1 {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Files {bar:40.green} {pos}/{len} [{elapsed_precise}] {msg}")
            .expect("Could not set progress bar style")
            .progress_chars("=>-"),
    );

    pb
}

fn progress_bar(file_size: u64, offset: Option<u64>, name: &str) -> ProgressBar {
    let pb = ProgressBar::new(file_size);

    if let Some(offset) = offset {
        pb.inc(offset);
    }

    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                &(name.to_owned()
                    + " {bar:40.cyan} {percent:.cyan}% | {bytes}/{total_bytes} ({eta})\n"),
            )
            .expect("Could not set progress bar style")
            .progress_chars("=>-"),
    );

    pb
}

fn spinner(name: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();

    pb.set_style(
        ProgressStyle::default_spinner()
            .template(&(name.to_owned() + " {spinner:.cyan} {bytes}"))
            .expect("Error setting progress style")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠏"),
    );

    pb
}
