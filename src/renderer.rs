//! The renderer: an external collaborator that writes a template's output to its destination
//! (spec §1, §6). Not part of the core reactive engine — the resolver decides *what* to render,
//! this decides *how* it lands on disk.

use crate::_prelude::*;

/// Result of one [`Render::render`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderOutcome {
	/// Whether the destination was actually overwritten.
	pub did_render: bool,
	/// Whether the destination would have been overwritten had this not been a dry run.
	pub would_render: bool,
}

/// `Render(bytes) → {didRender, wouldRender}` (spec §6). Implementations decide how and whether
/// to persist rendered output; the core never calls this directly, leaving it to the caller
/// driving the resolve loop.
pub trait Render: Send + Sync {
	/// Persist (or simulate persisting) `contents`.
	fn render(&self, contents: &[u8]) -> Result<RenderOutcome>;
}

/// Writes to a fixed destination path, atomically: a sibling temp file in the destination's
/// directory, with permissions copied from the existing file when present, then an atomic rename.
/// Skips the write (reporting `did_render: false`) when the destination already holds identical
/// bytes.
#[derive(Clone, Debug)]
pub struct FileRenderer {
	destination: std::path::PathBuf,
	dry_run: bool,
}
impl FileRenderer {
	/// Render to `destination`, overwriting it on every non-identical render.
	pub fn new(destination: impl Into<std::path::PathBuf>) -> Self {
		Self { destination: destination.into(), dry_run: false }
	}

	/// Compute `would_render` without touching the filesystem.
	pub fn dry_run(mut self, dry_run: bool) -> Self {
		self.dry_run = dry_run;
		self
	}
}
impl Render for FileRenderer {
	#[tracing::instrument(level = "debug", skip(self, contents), fields(path = %self.destination.display()))]
	fn render(&self, contents: &[u8]) -> Result<RenderOutcome> {
		let existing = std::fs::read(&self.destination).ok();
		let would_render = existing.as_deref() != Some(contents);

		if !would_render {
			return Ok(RenderOutcome { did_render: false, would_render: false });
		}

		if self.dry_run {
			return Ok(RenderOutcome { did_render: false, would_render: true });
		}

		let dir = self.destination.parent().unwrap_or_else(|| std::path::Path::new("."));
		let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
		std::io::Write::write_all(&mut tmp, contents)?;

		if let Ok(metadata) = std::fs::metadata(&self.destination) {
			std::fs::set_permissions(tmp.path(), metadata.permissions())?;
		}

		tmp.persist(&self.destination).map_err(|err| Error::Render(err.to_string()))?;

		Ok(RenderOutcome { did_render: true, would_render: true })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn writes_new_contents_and_reports_did_render() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("out.conf");
		let renderer = FileRenderer::new(&path);

		let outcome = renderer.render(b"hello").unwrap();
		assert_eq!(outcome, RenderOutcome { did_render: true, would_render: true });
		assert_eq!(std::fs::read(&path).unwrap(), b"hello");
	}

	#[test]
	fn identical_contents_are_a_no_op() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("out.conf");
		let renderer = FileRenderer::new(&path);

		renderer.render(b"hello").unwrap();
		let outcome = renderer.render(b"hello").unwrap();

		assert_eq!(outcome, RenderOutcome { did_render: false, would_render: false });
	}

	#[test]
	fn dry_run_reports_would_render_without_writing() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("out.conf");
		let renderer = FileRenderer::new(&path).dry_run(true);

		let outcome = renderer.render(b"hello").unwrap();
		assert_eq!(outcome, RenderOutcome { did_render: false, would_render: true });
		assert!(!path.exists());
	}
}
