//! HTML pages, compiled into the binary.

use axum::response::Html;
use tera::{Context, Tera};

use crate::errors::AppError;

pub const INDEX: &str = "index.html";
pub const GALLERY: &str = "gallery.html";
pub const ADMIN: &str = "admin.html";

pub fn load() -> tera::Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("base.html", include_str!("../assets/templates/base.html")),
        (INDEX, include_str!("../assets/templates/index.html")),
        (GALLERY, include_str!("../assets/templates/gallery.html")),
        (ADMIN, include_str!("../assets/templates/admin.html")),
    ])?;
    tera.autoescape_on(vec![".html"]);
    Ok(tera)
}

pub fn render(tera: &Tera, name: &str, context: &Context) -> Result<Html<String>, AppError> {
    tera.render(name, context)
        .map(Html)
        .map_err(|err| AppError::internal(format!("rendering {name}: {err}")))
}
