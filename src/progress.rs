//! Progress indicators for the apply walk

use indicatif::{ProgressBar, ProgressStyle};
use topology::{ProvisionError, ProvisionRequest, ProvisionResponse, Provisioner};

/// Bar over the resources of one apply run
pub fn apply_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );
    pb
}

/// Provisioner decorator that advances a progress bar per resource
///
/// Retried attempts re-set the message but only a success ticks the bar,
/// so throttling shows as a stalled position rather than false progress.
pub struct ProgressProvisioner<'a> {
    inner: &'a mut dyn Provisioner,
    bar: ProgressBar,
}

impl<'a> ProgressProvisioner<'a> {
    pub fn new(inner: &'a mut dyn Provisioner, bar: ProgressBar) -> Self {
        Self { inner, bar }
    }

    pub fn finish(self) {
        self.bar.finish_and_clear();
    }
}

impl Provisioner for ProgressProvisioner<'_> {
    fn provision(
        &mut self,
        request: &ProvisionRequest<'_>,
    ) -> Result<ProvisionResponse, ProvisionError> {
        self.bar.set_message(request.id.to_string());
        let result = self.inner.provision(request);
        if result.is_ok() {
            self.bar.inc(1);
        }
        result
    }
}
