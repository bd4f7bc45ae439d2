//! Mapping a client-declared name order onto the saved uploads.

use crate::error::{PrintMergeError, Result};
use crate::intake::InputFile;

/// How uploads whose name does not appear in the order hint are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderPolicy {
    /// Place them after every named file, keeping their upload order.
    #[default]
    AppendUnknown,
    /// Fail the request.
    RejectUnknown,
}

/// Reorder `saved` according to `hint`.
///
/// A file's rank is the index of the first occurrence of its name in the
/// hint. The sort is stable, so files with equal rank (duplicate names, or
/// names missing from the hint) keep their upload order. Without a hint the
/// upload order is returned unchanged. The output always has the same length
/// as the input.
///
/// # Errors
///
/// Under [`OrderPolicy::RejectUnknown`], returns `BadRequest` naming the first
/// upload that the hint does not mention.
///
/// # Examples
///
/// ```
/// use printmerge::order::{reconcile, OrderPolicy};
/// # use printmerge::intake::{DocumentKind, InputFile};
/// # fn file(name: &str) -> InputFile {
/// #     InputFile { name: name.into(), path: name.into(), kind: DocumentKind::Pdf, size: 0 }
/// # }
///
/// let saved = vec![file("a.pdf"), file("b.pdf"), file("c.pdf")];
/// let hint = vec!["c.pdf".to_string(), "a.pdf".to_string()];
///
/// let ordered = reconcile(saved, Some(hint.as_slice()), OrderPolicy::AppendUnknown).unwrap();
/// let names: Vec<_> = ordered.iter().map(|f| f.name.as_str()).collect();
/// assert_eq!(names, ["c.pdf", "a.pdf", "b.pdf"]);
/// ```
pub fn reconcile(
    saved: Vec<InputFile>,
    hint: Option<&[String]>,
    policy: OrderPolicy,
) -> Result<Vec<InputFile>> {
    let Some(hint) = hint else {
        return Ok(saved);
    };

    let rank = |file: &InputFile| hint.iter().position(|name| *name == file.name);

    if policy == OrderPolicy::RejectUnknown
        && let Some(missing) = saved.iter().find(|f| rank(*f).is_none())
    {
        return Err(PrintMergeError::bad_request(format!(
            "'{}' is missing from the requested order",
            missing.name
        )));
    }

    let mut ranked: Vec<(usize, InputFile)> = saved
        .into_iter()
        .map(|file| (rank(&file).unwrap_or(usize::MAX), file))
        .collect();

    // `sort_by_key` is stable: ties keep upload order.
    ranked.sort_by_key(|(rank, _)| *rank);

    Ok(ranked.into_iter().map(|(_, file)| file).collect())
}

/// Parse the multipart `order` field: a JSON array of file names.
///
/// # Errors
///
/// Returns `BadRequest` if the field is not a JSON array of strings.
pub fn parse_order_hint(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| PrintMergeError::bad_request(format!("Invalid order field: {e}")))
}
