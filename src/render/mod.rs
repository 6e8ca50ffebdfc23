//! Filesystem operations and template rendering for manifest bundles.
//!
//! Rendering uses handlebars. Bundle files may spell simple field expansions
//! either as `{{Field}}` or in the Go-template style `{{ .Field }}`; a
//! normalization pass rewrites the latter before rendering. Angle-bracket
//! tokens (`<namespace>`, `<applicationName>`, `<environment>`,
//! `<environmentMountPath>`) are deliberately NOT part of this dialect: they
//! belong to the pre-substitution applied to configuration strings and must
//! pass through file rendering untouched.

use std::path::Path;
use std::sync::LazyLock;

use handlebars::Handlebars;
use regex::Regex;
use serde::Serialize;
use walkdir::WalkDir;

use crate::errors::RenderError;

static GO_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\}\}")
        .expect("field pattern")
});

/// Rewrite `{{ .Field }}` spellings into `{{Field}}`.
fn normalize_fields(template: &str) -> String {
    GO_FIELD.replace_all(template, "{{$1}}").into_owned()
}

pub struct Renderer {
    text: Handlebars<'static>,
    html: Handlebars<'static>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        let mut text = Handlebars::new();
        text.register_escape_fn(handlebars::no_escape);
        let html = Handlebars::new();
        Self { text, html }
    }

    // ── Filesystem primitives ────────────────────────────────────────

    /// Copy a template source (file or directory tree) to a destination path.
    pub fn copy_dir(&self, src: &Path, dst: &Path) -> Result<(), RenderError> {
        let action = format!("copying {} to {}", src.display(), dst.display());
        if src.is_file() {
            copy_file_raw(src, dst, &action)?;
            return Ok(());
        }
        for entry in WalkDir::new(src) {
            let entry = entry.map_err(|e| RenderError::Io {
                action: action.clone(),
                source: e.into(),
            })?;
            let relative = entry
                .path()
                .strip_prefix(src)
                .expect("walked path under root");
            let target = dst.join(relative);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target).map_err(|e| RenderError::Io {
                    action: action.clone(),
                    source: e,
                })?;
            } else {
                copy_file_raw(entry.path(), &target, &action)?;
            }
        }
        Ok(())
    }

    pub fn copy_file(&self, src: &Path, dst: &Path) -> Result<(), RenderError> {
        let action = format!("copying {} to {}", src.display(), dst.display());
        copy_file_raw(src, dst, &action)
    }

    pub fn create_dir(&self, path: &Path) -> Result<(), RenderError> {
        std::fs::create_dir_all(path).map_err(|e| RenderError::Io {
            action: format!("creating directory {}", path.display()),
            source: e,
        })
    }

    pub fn remove_dir(&self, path: &Path) -> Result<(), RenderError> {
        if !path.exists() {
            return Ok(());
        }
        std::fs::remove_dir_all(path).map_err(|e| RenderError::Io {
            action: format!("removing directory {}", path.display()),
            source: e,
        })
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    pub fn rename(&self, src: &Path, dst: &Path) -> Result<(), RenderError> {
        std::fs::rename(src, dst).map_err(|e| RenderError::Io {
            action: format!("renaming {} to {}", src.display(), dst.display()),
            source: e,
        })
    }

    pub fn delete_file(&self, path: &Path) -> Result<(), RenderError> {
        std::fs::remove_file(path).map_err(|e| RenderError::Io {
            action: format!("deleting file {}", path.display()),
            source: e,
        })
    }

    // ── Rendering ────────────────────────────────────────────────────

    /// Render one file in place with the given values, then strip blank lines.
    pub fn apply_template<T: Serialize>(&self, path: &Path, values: &T) -> Result<(), RenderError> {
        let raw = read_file(path)?;
        let rendered = self.render_str(&raw, values, path, false)?;
        write_file(path, rendered.as_bytes())?;
        self.clear_blank_lines(path)
    }

    /// Walk a tree and apply the template to every regular file.
    pub fn apply_template_recursively<T: Serialize>(
        &self,
        root: &Path,
        values: &T,
    ) -> Result<(), RenderError> {
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(|e| RenderError::Io {
                action: format!("walking {}", root.display()),
                source: e.into(),
            })?;
            if entry.file_type().is_file() {
                self.apply_template(entry.path(), values)?;
            }
        }
        Ok(())
    }

    /// Render a template file to a buffer. With `html_safe`, values are
    /// HTML-escaped (used only for wiki content).
    pub fn load_template<T: Serialize>(
        &self,
        path: &Path,
        values: &T,
        html_safe: bool,
    ) -> Result<Vec<u8>, RenderError> {
        let raw = read_file(path)?;
        let rendered = self.render_str(&raw, values, path, html_safe)?;
        Ok(rendered.into_bytes())
    }

    /// Append `line` unless some line of the file already equals it after
    /// trimming. Blank lines are dropped in the rewrite. Idempotent.
    pub fn ensure_line(&self, path: &Path, line: &str) -> Result<(), RenderError> {
        let raw = read_file(path)?;
        let mut out = String::new();
        let mut present = false;
        for l in raw.lines() {
            if !l.is_empty() {
                out.push_str(l);
                out.push('\n');
            }
            if l.trim() == line.trim() {
                present = true;
            }
        }
        if !present {
            out.push_str(line);
            out.push('\n');
        }
        write_file(path, out.as_bytes())
    }

    /// Drop every line that is blank after trimming.
    pub fn clear_blank_lines(&self, path: &Path) -> Result<(), RenderError> {
        let raw = read_file(path)?;
        let mut out = String::new();
        for line in raw.lines() {
            if !line.trim().is_empty() {
                out.push_str(line);
                out.push('\n');
            }
        }
        write_file(path, out.as_bytes())
    }

    fn render_str<T: Serialize>(
        &self,
        raw: &str,
        values: &T,
        path: &Path,
        html_safe: bool,
    ) -> Result<String, RenderError> {
        let normalized = normalize_fields(raw);
        let registry = if html_safe { &self.html } else { &self.text };
        registry
            .render_template(&normalized, values)
            .map_err(|e| RenderError::Template {
                path: path.display().to_string(),
                detail: e.to_string(),
            })
    }
}

fn read_file(path: &Path) -> Result<String, RenderError> {
    std::fs::read_to_string(path).map_err(|e| RenderError::Io {
        action: format!("reading file {}", path.display()),
        source: e,
    })
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), RenderError> {
    std::fs::write(path, contents).map_err(|e| RenderError::Io {
        action: format!("writing file {}", path.display()),
        source: e,
    })
}

fn copy_file_raw(src: &Path, dst: &Path, action: &str) -> Result<(), RenderError> {
    if let Some(parent) = dst.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| RenderError::Io {
            action: action.to_string(),
            source: e,
        })?;
    }
    std::fs::copy(src, dst).map_err(|e| RenderError::Io {
        action: action.to_string(),
        source: e,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Serialize)]
    struct Values {
        #[serde(rename = "Namespace")]
        namespace: String,
        #[serde(rename = "ApplicationName")]
        application_name: String,
    }

    fn values() -> Values {
        Values {
            namespace: "cd".to_string(),
            application_name: "orders-svc".to_string(),
        }
    }

    #[test]
    fn normalize_rewrites_go_style_fields() {
        assert_eq!(normalize_fields("{{ .Namespace }}"), "{{Namespace}}");
        assert_eq!(normalize_fields("{{.Namespace}}"), "{{Namespace}}");
        assert_eq!(normalize_fields("{{Namespace}}"), "{{Namespace}}");
        assert_eq!(normalize_fields("name: {{ .App.Name }}"), "name: {{App.Name}}");
    }

    #[test]
    fn normalize_leaves_angle_tokens_alone() {
        assert_eq!(normalize_fields("path: <namespace>/x"), "path: <namespace>/x");
        assert_eq!(
            normalize_fields("<environmentMountPath>/secrets"),
            "<environmentMountPath>/secrets"
        );
    }

    #[test]
    fn apply_template_substitutes_and_strips_blank_lines() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("deploy.yaml");
        fs::write(
            &file,
            "namespace: {{ .Namespace }}\n\nname: {{ .ApplicationName }}\n\n",
        )
        .unwrap();

        let renderer = Renderer::new();
        renderer.apply_template(&file, &values()).unwrap();

        let out = fs::read_to_string(&file).unwrap();
        assert_eq!(out, "namespace: cd\nname: orders-svc\n");
    }

    #[test]
    fn apply_template_does_not_expand_angle_tokens() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("kustomization.yaml");
        fs::write(&file, "- <namespace>/\n").unwrap();

        let renderer = Renderer::new();
        renderer.apply_template(&file, &values()).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "- <namespace>/\n");
    }

    #[test]
    fn apply_template_recursively_touches_every_file() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("base/inner")).unwrap();
        fs::write(dir.path().join("base/a.yaml"), "ns: {{ .Namespace }}\n").unwrap();
        fs::write(dir.path().join("base/inner/b.yaml"), "app: {{ .ApplicationName }}\n").unwrap();

        let renderer = Renderer::new();
        renderer
            .apply_template_recursively(&dir.path().join("base"), &values())
            .unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("base/a.yaml")).unwrap(), "ns: cd\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("base/inner/b.yaml")).unwrap(),
            "app: orders-svc\n"
        );
    }

    #[test]
    fn load_template_html_safe_escapes_markup() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("page.html");
        fs::write(&file, "<p>{{ .ApplicationName }}</p>").unwrap();

        let renderer = Renderer::new();
        let html = renderer
            .load_template(
                &file,
                &Values {
                    namespace: "cd".to_string(),
                    application_name: "a<b>&c".to_string(),
                },
                true,
            )
            .unwrap();
        assert_eq!(String::from_utf8(html).unwrap(), "<p>a&lt;b&gt;&amp;c</p>");
    }

    #[test]
    fn load_template_plain_does_not_escape() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("snippet.yaml");
        fs::write(&file, "v: {{ .ApplicationName }}").unwrap();

        let renderer = Renderer::new();
        let out = renderer
            .load_template(
                &file,
                &Values {
                    namespace: "cd".to_string(),
                    application_name: "a&b".to_string(),
                },
                false,
            )
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "v: a&b");
    }

    #[test]
    fn ensure_line_appends_once() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("kustomization.yaml");
        fs::write(&file, "resources:\n- _base.yaml\n").unwrap();

        let renderer = Renderer::new();
        renderer.ensure_line(&file, "- orders-svc.yaml").unwrap();
        renderer.ensure_line(&file, "- orders-svc.yaml").unwrap();

        let out = fs::read_to_string(&file).unwrap();
        assert_eq!(out.matches("- orders-svc.yaml").count(), 1);
    }

    #[test]
    fn ensure_line_matches_on_trimmed_lines() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("kustomization.yaml");
        fs::write(&file, "  - cd/\n").unwrap();

        let renderer = Renderer::new();
        renderer.ensure_line(&file, "- cd/").unwrap();
        let out = fs::read_to_string(&file).unwrap();
        assert_eq!(out, "  - cd/\n");
    }

    #[test]
    fn copy_dir_replicates_a_tree() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/sub")).unwrap();
        fs::write(dir.path().join("src/a.txt"), "a").unwrap();
        fs::write(dir.path().join("src/sub/b.txt"), "b").unwrap();

        let renderer = Renderer::new();
        renderer
            .copy_dir(&dir.path().join("src"), &dir.path().join("dst"))
            .unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("dst/a.txt")).unwrap(), "a");
        assert_eq!(fs::read_to_string(dir.path().join("dst/sub/b.txt")).unwrap(), "b");
    }

    #[test]
    fn copy_dir_accepts_a_single_file_source() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("kustomization.yaml"), "resources:\n").unwrap();

        let renderer = Renderer::new();
        renderer
            .copy_dir(
                &dir.path().join("kustomization.yaml"),
                &dir.path().join("out/kustomization.yaml"),
            )
            .unwrap();
        assert!(dir.path().join("out/kustomization.yaml").exists());
    }

    #[test]
    fn remove_dir_on_missing_path_is_ok() {
        let dir = tempdir().unwrap();
        let renderer = Renderer::new();
        renderer.remove_dir(&dir.path().join("nothing-here")).unwrap();
    }

    #[test]
    fn rename_and_delete_files() {
        let dir = tempdir().unwrap();
        let renderer = Renderer::new();
        fs::write(dir.path().join("old.txt"), "x").unwrap();
        renderer
            .rename(&dir.path().join("old.txt"), &dir.path().join("new.txt"))
            .unwrap();
        assert!(renderer.exists(&dir.path().join("new.txt")));
        renderer.delete_file(&dir.path().join("new.txt")).unwrap();
        assert!(!renderer.exists(&dir.path().join("new.txt")));
    }
}
