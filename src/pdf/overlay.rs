//! `PdfOverlay` (spec §4.7), grounded in `pdf_tool_util.py`'s
//! `gen_preview_pdf`/`gen_signed_pdf`. `lopdf` replaces `pikepdf` +
//! `reportlab`: instead of composing a one-page overlay PDF with a canvas
//! library and merging it, this builds content-stream operators directly
//! and prepends them to each target page's existing content.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::payload::{FieldType, SignatureField};
use crate::pdf::font::{self, SignatureFont};

const LINE_WIDTH: f64 = 6.0;
const HINT_MSG_X_OFFSET: f64 = 6.0;
const SIG_MSG_X_OFFSET: f64 = 3.0;

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("pdf parse/serialize error: {0}")]
    Lopdf(#[from] lopdf::Error),
    #[error("field position ({x}, {y}) with height {height} is outside page MediaBox")]
    OutOfBounds { x: f64, y: f64, height: f64 },
    #[error("pageNo {0} is out of range for this document")]
    BadPageNo(u32),
    #[error("PDF is password-protected or otherwise not modifiable")]
    NotModifiable,
}

/// One signer's rendering input for a single pass over the document.
pub struct OverlaySigner<'a> {
    pub idx: u32,
    pub name: &'a str,
    pub locale: &'a str,
    pub field_list: &'a [SignatureField],
    /// Preview-only: true for the signer currently being sent to.
    pub sign_hint: bool,
    /// Final-only.
    pub signing_time: Option<&'a str>,
}

fn mediabox_of(doc: &Document, page_id: ObjectId) -> Result<(f64, f64, f64, f64), PdfError> {
    let arr = doc
        .get_object(page_id)
        .ok()
        .and_then(|o| o.as_dict().ok())
        .and_then(|d| d.get(b"MediaBox").ok())
        .and_then(|o| doc.dereference(o).ok())
        .and_then(|(_, o)| o.as_array().ok().cloned())
        .or_else(|| {
            // MediaBox can be inherited from the Pages tree; fall back to
            // the document's root Pages node.
            doc.catalog()
                .ok()
                .and_then(|cat| cat.get(b"Pages").ok().cloned())
                .and_then(|o| doc.dereference(&o).ok())
                .and_then(|(_, o)| o.as_dict().ok().cloned())
                .and_then(|d| d.get(b"MediaBox").ok().cloned())
                .and_then(|o| o.as_array().ok().cloned())
        })
        .ok_or(PdfError::BadPageNo(0))?;

    let nums: Vec<f64> = arr
        .iter()
        .map(|o| o.as_float().unwrap_or_else(|_| o.as_i64().unwrap_or(0) as f64))
        .collect();
    Ok((nums[0], nums[1], nums[2], nums[3]))
}

fn check_bounds(
    page_w: f64,
    page_h: f64,
    field: &SignatureField,
) -> Result<(), PdfError> {
    if field.x < 0.0 || field.x > page_w || field.y < 0.0 || field.y > page_h
        || (field.y + field.height) > page_h
    {
        return Err(PdfError::OutOfBounds {
            x: field.x,
            y: field.y,
            height: field.height,
        });
    }
    Ok(())
}

fn ensure_font_resource(doc: &mut Document, page_id: ObjectId, resource_name: &str, base_font: &str) {
    let page = doc.get_dictionary(page_id).cloned().unwrap_or_default();
    let resources_id = match page.get(b"Resources") {
        Ok(Object::Reference(r)) => *r,
        Ok(Object::Dictionary(_)) | Err(_) => {
            let dict = Dictionary::new();
            let id = doc.add_object(Object::Dictionary(dict));
            doc.objects
                .entry(page_id)
                .and_modify(|o| {
                    if let Object::Dictionary(d) = o {
                        d.set("Resources", Object::Reference(id));
                    }
                });
            id
        }
        _ => return,
    };

    let font_dict_id = {
        let resources = doc.get_dictionary_mut(resources_id).ok();
        match resources.and_then(|r| r.get(b"Font").ok().cloned()) {
            Some(Object::Reference(r)) => r,
            _ => {
                let id = doc.add_object(Object::Dictionary(Dictionary::new()));
                if let Ok(r) = doc.get_dictionary_mut(resources_id) {
                    r.set("Font", Object::Reference(id));
                }
                id
            }
        }
    };

    let already_present = doc
        .get_dictionary(font_dict_id)
        .map(|d| d.has(resource_name.as_bytes()))
        .unwrap_or(false);
    if already_present {
        return;
    }

    let mut font_obj = Dictionary::new();
    font_obj.set("Type", Object::Name(b"Font".to_vec()));
    font_obj.set("Subtype", Object::Name(b"Type1".to_vec()));
    font_obj.set("BaseFont", Object::Name(base_font.as_bytes().to_vec()));
    let font_id = doc.add_object(Object::Dictionary(font_obj));

    if let Ok(font_dict) = doc.get_dictionary_mut(font_dict_id) {
        font_dict.set(resource_name, Object::Reference(font_id));
    }
}

fn text_op(font_resource: &str, size: f64, x: f64, y: f64, text: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(font_resource.as_bytes().to_vec()), size.into()],
        ),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]
}

fn fill_color_op(r: f64, g: f64, b: f64) -> Operation {
    Operation::new("rg", vec![r.into(), g.into(), b.into()])
}

fn draw_border(page_height: f64, x: f64, y: f64, height: f64) -> Vec<Operation> {
    vec![
        Operation::new("w", vec![LINE_WIDTH.into()]),
        Operation::new("RG", vec![0.203.into(), 0.596.into(), 0.858.into()]),
        Operation::new(
            "m",
            vec![(x + LINE_WIDTH / 2.0).into(), (page_height - (y + height)).into()],
        ),
        Operation::new(
            "l",
            vec![(x + LINE_WIDTH / 2.0).into(), (page_height - y).into()],
        ),
        Operation::new("S", vec![]),
    ]
}

fn sign_hint_lines(locale: &str) -> Vec<&'static str> {
    if locale.to_lowercase() == "zh-tw" {
        vec!["您的簽名將顯示在這裡"]
    } else {
        vec!["Your signature will", "be placed here"]
    }
}

fn draw_sign_hint(doc: &mut Document, page_id: ObjectId, page_height: f64, field: &SignatureField, locale: &str) -> Vec<Operation> {
    ensure_font_resource(doc, page_id, "HanaMinA", "Helvetica");
    let mut ops = draw_border(page_height, field.x, field.y, field.height);
    let lines = sign_hint_lines(locale);
    let font_size = font::fit_font_size(
        font::HANAMIN_ASCENT_RATIO * font::HANAMIN_FONT_FACTOR,
        field.height,
        font::HINT_HEIGHT_RATIO * lines.len() as f64,
    );
    ops.push(fill_color_op(0.203, 0.596, 0.858));
    for (i, line) in lines.iter().enumerate() {
        let y = page_height
            - (field.y
                + (font::HANAMIN_ASCENT_RATIO * font::HANAMIN_FONT_FACTOR * font_size) * (i + 1) as f64);
        ops.extend(text_op(
            "HanaMinA",
            font_size,
            field.x + LINE_WIDTH / 2.0 + HINT_MSG_X_OFFSET,
            y,
            line,
        ));
    }
    ops
}

fn draw_seal_placeholder(page_height: f64, field: &SignatureField) -> Vec<Operation> {
    vec![
        fill_color_op(0.85, 0.85, 0.85),
        Operation::new(
            "re",
            vec![
                field.x.into(),
                (page_height - (field.y + field.height)).into(),
                field.height.into(),
                field.height.into(),
            ],
        ),
        Operation::new("f", vec![]),
    ]
}

fn draw_sig_field(
    doc: &mut Document,
    page_id: ObjectId,
    is_preview: bool,
    page_height: f64,
    field: &SignatureField,
    name: &str,
    magic_number: &str,
    signer_idx: u32,
) -> Vec<Operation> {
    let mut ops = draw_seal_placeholder(page_height, field);

    let signature_font = font::choose_signature_font(name);
    let base_font_name = match signature_font {
        SignatureFont::DancingScript => "Helvetica-Oblique",
        SignatureFont::JasonHandwriting => "Helvetica-Oblique",
    };
    ensure_font_resource(doc, page_id, signature_font.base14_name(), base_font_name);
    ensure_font_resource(doc, page_id, "Inconsolata-Regular", "Courier");

    let x_offset = field.height;
    let sig_font_size = font::signature_font_size(signature_font, field.height);
    ops.push(fill_color_op(0.015, 0.109, 0.674));
    ops.extend(text_op(
        signature_font.base14_name(),
        sig_font_size,
        field.x + x_offset + SIG_MSG_X_OFFSET,
        page_height - (field.y + sig_font_size),
        name,
    ));

    if !is_preview {
        let info_font_size = field.height / 5.0;
        let signer_idx_str = format!("{:02}", signer_idx % 100);
        ops.push(fill_color_op(0.0, 0.0, 0.0));
        ops.extend(text_op(
            "Inconsolata-Regular",
            info_font_size,
            field.x + x_offset + SIG_MSG_X_OFFSET,
            page_height - (field.y + field.height - info_font_size / 5.0),
            &format!("{} ({})", magic_number, signer_idx_str),
        ));
    }
    ops
}

fn draw_text_field(doc: &mut Document, page_id: ObjectId, page_height: f64, field: &SignatureField, text: &str) -> Vec<Operation> {
    ensure_font_resource(doc, page_id, "Inconsolata-Regular", "Courier");
    let mut ops = vec![fill_color_op(0.0, 0.0, 0.0)];
    ops.extend(text_op(
        "Inconsolata-Regular",
        field.height,
        field.x,
        page_height - (field.y + field.height),
        text,
    ));
    ops
}

fn group_fields_by_page<'a>(
    signers: &'a [OverlaySigner<'a>],
) -> BTreeMap<u32, Vec<(&'a OverlaySigner<'a>, &'a SignatureField)>> {
    let mut by_page: BTreeMap<u32, Vec<(&OverlaySigner, &SignatureField)>> = BTreeMap::new();
    for signer in signers {
        for field in signer.field_list {
            by_page.entry(field.page_no).or_default().push((signer, field));
        }
    }
    by_page
}

fn overlay_content(
    doc: &mut Document,
    page_id: ObjectId,
    page_height: f64,
    fields: &[(&OverlaySigner, &SignatureField)],
    magic_number: &str,
    is_preview: bool,
) -> Vec<Operation> {
    let mut ops = Vec::new();
    for (signer, field) in fields {
        match field.field_type {
            FieldType::Signature => {
                if is_preview {
                    if signer.sign_hint {
                        ops.extend(draw_sign_hint(doc, page_id, page_height, field, signer.locale));
                    } else {
                        ops.extend(draw_sig_field(doc, page_id, true, page_height, field, signer.name, "", signer.idx));
                    }
                } else {
                    ops.extend(draw_sig_field(
                        doc,
                        page_id,
                        false,
                        page_height,
                        field,
                        signer.name,
                        magic_number,
                        signer.idx,
                    ));
                }
            }
            FieldType::Date => {
                if !is_preview {
                    let text = signer.signing_time.unwrap_or("");
                    ops.extend(draw_text_field(doc, page_id, page_height, field, text));
                }
            }
        }
    }
    ops
}

fn render(
    pdf_bytes: &[u8],
    signers: &[OverlaySigner],
    magic_number: &str,
    is_preview: bool,
    password: Option<&str>,
) -> Result<Vec<u8>, PdfError> {
    let mut doc = Document::load_mem(pdf_bytes)?;
    let pages = doc.get_pages();
    let by_page = group_fields_by_page(signers);

    for (page_no, fields) in by_page {
        let page_id = *pages
            .get(&page_no)
            .ok_or(PdfError::BadPageNo(page_no))?;
        let (x0, y0, x1, y1) = mediabox_of(&doc, page_id)?;
        let page_w = x1 - x0;
        let page_h = y1 - y0;
        for (_, field) in &fields {
            check_bounds(page_w, page_h, field)?;
        }

        let new_ops = overlay_content(&mut doc, page_id, page_h, &fields, magic_number, is_preview);
        if new_ops.is_empty() {
            continue;
        }

        let existing = doc.get_page_content(page_id).unwrap_or_default();
        let mut content = Content::decode(&existing).unwrap_or(Content { operations: vec![] });
        content.operations.extend(new_ops);
        let encoded = content.encode()?;
        doc.change_page_content(page_id, encoded)?;
    }

    if let Some(pw) = password {
        crate::pdf::encryption::encrypt_document(&mut doc, pw)
            .map_err(|_| PdfError::NotModifiable)?;
    }

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

/// Preview render: hint or greyed signature per signer, no magic number,
/// date fields untouched (spec §4.7 "Preview"). `password` is set iff
/// `enhancedPrivacy` is on for the task.
pub fn render_preview(
    pdf_bytes: &[u8],
    signers: &[OverlaySigner],
    password: Option<&str>,
) -> Result<Vec<u8>, PdfError> {
    render(pdf_bytes, signers, "", true, password)
}

/// Final render: seal + name + magic-number watermark, date fields filled
/// with the signing-time string, plus the `letsesign=true` tombstone.
pub fn render_final(pdf_bytes: &[u8], signers: &[OverlaySigner], magic_number: &str) -> Result<Vec<u8>, PdfError> {
    let short_magic = &magic_number[..magic_number.len().min(32)];
    let rendered = render(pdf_bytes, signers, short_magic, false, None)?;
    Ok(append_tombstone(rendered))
}

fn append_tombstone(mut pdf_bytes: Vec<u8>) -> Vec<u8> {
    let mut marker = String::new();
    if pdf_bytes.last() != Some(&b'\n') {
        marker.push('\n');
    }
    marker.push_str("letsesign=true\n");
    pdf_bytes.extend_from_slice(marker.as_bytes());
    pdf_bytes
}

/// `test_signed_pdf(bytes) -> bool` (spec §4.7): scans the trailer past
/// the last `%%EOF` for `;`-separated `k=v` pairs.
pub fn test_signed_pdf(pdf_bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(pdf_bytes);
    let Some(eof_pos) = text.rfind("%%EOF") else {
        return false;
    };
    let trailer = &text[eof_pos + "%%EOF".len()..];
    trailer
        .split(|c| c == ';' || c == '\n')
        .any(|kv| kv.trim() == "letsesign=true")
}

/// `test_pdf_modifiable(bytes, signerList) -> bool` (spec §4.7): a dry-run
/// preview render that dummies in every real signer's actual `fieldList`
/// geometry, so an out-of-bounds field or bad `pageNo` for any signer is
/// caught here instead of surfacing later as `GENERATE_SIGNING_PDF_FAIL`.
pub fn test_pdf_modifiable(pdf_bytes: &[u8], signer_field_lists: &[Vec<SignatureField>]) -> bool {
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(d) => d,
        Err(_) => return false,
    };
    if doc.is_encrypted() {
        return false;
    }
    let dummy_signers: Vec<OverlaySigner> = signer_field_lists
        .iter()
        .enumerate()
        .map(|(idx, field_list)| OverlaySigner {
            idx: idx as u32,
            name: "dry-run",
            locale: "en-us",
            field_list,
            sign_hint: false,
            signing_time: Some(""),
        })
        .collect();
    render_preview(pdf_bytes, &dummy_signers, None).is_ok()
}
