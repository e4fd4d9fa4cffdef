//! Export
//!
//! Barcode rendering and document assembly for a finalized document.
//! Both are external collaborators behind traits; each identifier renders
//! independently so one rejection never blocks the rest.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::validation::{DocumentSnapshot, ValidatedIdentifier};
use crate::vision::engine::run_with_stdin;

/// Renders one sanitized identifier as a barcode image
pub trait BarcodeRenderer {
    fn render(&self, identifier: &str) -> Result<Vec<u8>>;
}

/// Combines page images into one document, in input order
pub trait DocumentAssembler {
    fn assemble(&self, images: &[Vec<u8>]) -> Result<Vec<u8>>;
}

/// A rendered barcode and the identifier it encodes
#[derive(Debug, Clone)]
pub struct RenderedBarcode {
    pub identifier: ValidatedIdentifier,
    pub image: Vec<u8>,
}

/// Outcome of rendering a whole document
#[derive(Debug, Default)]
pub struct BarcodeBatch {
    /// Successful renders, in document order
    pub rendered: Vec<RenderedBarcode>,
    /// One `RendererRejected` per failed identifier
    pub rejected: Vec<PipelineError>,
}

impl BarcodeBatch {
    pub fn images(&self) -> Vec<Vec<u8>> {
        self.rendered.iter().map(|r| r.image.clone()).collect()
    }
}

/// Render every identifier of `snapshot`
pub fn export_barcodes(renderer: &dyn BarcodeRenderer, snapshot: &DocumentSnapshot) -> BarcodeBatch {
    let mut batch = BarcodeBatch::default();

    for identifier in &snapshot.identifiers {
        match renderer.render(&identifier.value) {
            Ok(image) => batch.rendered.push(RenderedBarcode {
                identifier: identifier.clone(),
                image,
            }),
            Err(e) => {
                warn!("Barcode rejected for '{}': {:#}", identifier.value, e);
                batch.rejected.push(PipelineError::RendererRejected {
                    identifier: identifier.value.clone(),
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    info!(
        "Rendered {} barcode(s), {} rejected",
        batch.rendered.len(),
        batch.rejected.len()
    );
    batch
}

/// Assemble the rendered barcodes into one document
pub fn assemble_document(assembler: &dyn DocumentAssembler, batch: &BarcodeBatch) -> Result<Vec<u8>> {
    if batch.rendered.is_empty() {
        bail!("No rendered barcodes to assemble");
    }
    assembler
        .assemble(&batch.images())
        .context("Document assembly failed")
}

/// Write one identifier per line
pub fn write_identifier_list(snapshot: &DocumentSnapshot, path: &Path) -> Result<()> {
    let mut content = snapshot.values().join("\n");
    content.push('\n');
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Save each rendered barcode as `<index>_<identifier>.png` under `dir`
pub fn save_barcodes(batch: &BarcodeBatch, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut paths = Vec::with_capacity(batch.rendered.len());
    for (i, barcode) in batch.rendered.iter().enumerate() {
        let path = dir.join(format!("{:03}_{}.png", i + 1, barcode.identifier.value));
        std::fs::write(&path, &barcode.image)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        paths.push(path);
    }
    Ok(paths)
}

/// Renderer backed by an external command
///
/// The identifier is written to the command's stdin; stdout is the image.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandRenderer {
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().context("Barcode command is empty")?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl BarcodeRenderer for CommandRenderer {
    fn render(&self, identifier: &str) -> Result<Vec<u8>> {
        let image = run_with_stdin(&self.program, &self.args, identifier.as_bytes())?;
        if image.is_empty() {
            bail!("'{}' produced no image", self.program);
        }
        Ok(image)
    }
}

/// Assembler backed by an external command
///
/// `{inputs}` expands to the page image paths and `{output}` to the path
/// the command must write the document to.
#[derive(Debug, Clone)]
pub struct CommandAssembler {
    template: Vec<String>,
}

impl CommandAssembler {
    pub fn from_command_line(command: &str) -> Result<Self> {
        let template: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if template.is_empty() {
            bail!("Document command is empty");
        }
        if !template.iter().any(|t| t.contains("{output}")) {
            bail!("Document command must contain {{output}}");
        }
        Ok(Self { template })
    }

    fn command_line(&self, inputs: &[PathBuf], output: &Path) -> Vec<String> {
        let mut line = Vec::new();
        for token in &self.template {
            if token == "{inputs}" {
                line.extend(inputs.iter().map(|p| p.display().to_string()));
            } else {
                line.push(token.replace("{output}", &output.display().to_string()));
            }
        }
        line
    }
}

impl DocumentAssembler for CommandAssembler {
    fn assemble(&self, images: &[Vec<u8>]) -> Result<Vec<u8>> {
        let workdir = tempfile::tempdir().context("Failed to create assembly directory")?;

        let mut inputs = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let path = workdir.path().join(format!("page_{:04}.png", i));
            std::fs::write(&path, image)?;
            inputs.push(path);
        }
        let output = workdir.path().join("document.pdf");

        let line = self.command_line(&inputs, &output);
        let (program, args) = line.split_first().context("Document command is empty")?;
        debug!("Assembling {} page(s) with '{}'", images.len(), program);

        let result = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to start '{}'", program))?;
        if !result.status.success() {
            bail!(
                "'{}' exited with {}: {}",
                program,
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            );
        }

        std::fs::read(&output).with_context(|| format!("'{}' did not write {}", program, output.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::CandidateId;
    use anyhow::anyhow;
    use uuid::Uuid;

    /// Accepts digits and uppercase letters except 'Q'
    struct PickyRenderer;

    impl BarcodeRenderer for PickyRenderer {
        fn render(&self, identifier: &str) -> Result<Vec<u8>> {
            if identifier.contains('Q') {
                return Err(anyhow!("unsupported character 'Q'"));
            }
            Ok(identifier.as_bytes().to_vec())
        }
    }

    struct ConcatAssembler;

    impl DocumentAssembler for ConcatAssembler {
        fn assemble(&self, images: &[Vec<u8>]) -> Result<Vec<u8>> {
            Ok(images.join(&b'|'))
        }
    }

    fn snapshot(values: &[&str]) -> DocumentSnapshot {
        DocumentSnapshot {
            session_id: Uuid::new_v4(),
            pages: vec![0],
            identifiers: values
                .iter()
                .enumerate()
                .map(|(i, v)| ValidatedIdentifier {
                    value: v.to_string(),
                    page_index: 0,
                    source: CandidateId::new(0, i, 0),
                })
                .collect(),
        }
    }

    #[test]
    fn test_rejection_does_not_block_others() {
        let batch = export_barcodes(&PickyRenderer, &snapshot(&["AB12", "Q55", "CD34"]));

        let rendered: Vec<&str> = batch.rendered.iter().map(|r| r.identifier.value.as_str()).collect();
        assert_eq!(rendered, vec!["AB12", "CD34"]);
        assert_eq!(batch.rejected.len(), 1);
        assert!(matches!(
            &batch.rejected[0],
            PipelineError::RendererRejected { identifier, .. } if identifier == "Q55"
        ));
    }

    #[test]
    fn test_assemble_keeps_order() {
        let batch = export_barcodes(&PickyRenderer, &snapshot(&["A1", "B2", "C3"]));
        let document = assemble_document(&ConcatAssembler, &batch).unwrap();
        assert_eq!(document, b"A1|B2|C3".to_vec());
    }

    #[test]
    fn test_assemble_requires_barcodes() {
        let batch = export_barcodes(&PickyRenderer, &snapshot(&["Q1"]));
        assert!(assemble_document(&ConcatAssembler, &batch).is_err());
    }

    #[test]
    fn test_save_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let snap = snapshot(&["AB12", "CD34"]);

        write_identifier_list(&snap, &dir.path().join("identifiers.txt")).unwrap();
        let list = std::fs::read_to_string(dir.path().join("identifiers.txt")).unwrap();
        assert_eq!(list, "AB12\nCD34\n");

        let batch = export_barcodes(&PickyRenderer, &snap);
        let paths = save_barcodes(&batch, &dir.path().join("barcodes")).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("001_AB12.png"));
        assert_eq!(std::fs::read(&paths[1]).unwrap(), b"CD34".to_vec());
    }

    #[test]
    fn test_assembler_template_expansion() {
        let assembler = CommandAssembler::from_command_line("img2pdf {inputs} -o {output}").unwrap();
        let line = assembler.command_line(
            &[PathBuf::from("/t/a.png"), PathBuf::from("/t/b.png")],
            Path::new("/t/out.pdf"),
        );
        assert_eq!(line, vec!["img2pdf", "/t/a.png", "/t/b.png", "-o", "/t/out.pdf"]);

        assert!(CommandAssembler::from_command_line("img2pdf {inputs}").is_err());
        assert!(CommandAssembler::from_command_line("   ").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_renderer_pipes_identifier() {
        let renderer = CommandRenderer::from_command_line("cat").unwrap();
        assert_eq!(renderer.render("AB12").unwrap(), b"AB12".to_vec());

        let failing = CommandRenderer::from_command_line("false").unwrap();
        assert!(failing.render("AB12").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_assembler_reads_output() {
        let assembler = CommandAssembler::from_command_line("cp {inputs} {output}").unwrap();
        let document = assembler.assemble(&[b"page".to_vec()]).unwrap();
        assert_eq!(document, b"page".to_vec());
    }
}
