//-
// Copyright (c) 2020, 2024, Jason Lingle
//
// This file is part of Ferrymap.
//
// Ferrymap is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Ferrymap is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Ferrymap. If not, see <http://www.gnu.org/licenses/>.

use crate::mime::message::{MimeNode, ParsedMessage};

/// The RFC 3501 `BODYSTRUCTURE` structure, sort of.
///
/// The actual `BODYSTRUCTURE` structure depends on the content type of each
/// part, and on whether the client requested `BODY` or `BODYSTRUCTURE`. This
/// structure is the union of every field we could need; the response writer
/// picks the ones that apply.
///
/// The format on the wire, with § marking the boundary between the "basic"
/// and "extended" fields:
///
/// - `multipart/*`: (child)(child)(...) content-subtype §
///   (content-type-parms) (content-disposition content-disposition-parms)
///   content-language content-location
/// - `text/*`: content-type content-subtype (content-type-parms) content-id
///   content-description content-transfer-encoding size-octets size-lines §
///   md5 (content-disposition content-disposition-parms) content-language
///   content-location
/// - `*/*`: content-type content-subtype (content-type-parms) content-id
///   content-description content-transfer-encoding size-octets §
///   md5 (content-disposition content-disposition-parms) content-language
///   content-location
///
/// Parts never carry an id, description, MD5, language or location, so
/// those are always NIL and have no fields here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyStructure {
    /// The content type and subtype of this part, lowercase.
    pub content_type: (String, String),
    /// Any parameters on the content type.
    pub content_type_parms: Vec<(String, String)>,
    /// The `Content-Disposition` of this part, if set.
    pub content_disposition: Option<String>,
    /// Any parameters on the `Content-Disposition` header.
    pub content_disposition_parms: Vec<(String, String)>,
    /// The `Content-Transfer-Encoding` of this part. Empty for multiparts.
    pub content_transfer_encoding: String,
    /// The exact length of the content of this part, in encoded form.
    pub size_octets: u64,
    /// The number of lines of the content of this part, in encoded form.
    pub size_lines: u64,
    /// Whether to report the extension fields (`BODYSTRUCTURE` rather than
    /// `BODY`).
    pub extended: bool,
    /// If this is a multipart, the parts it contains.
    pub children: Vec<BodyStructure>,
}

impl BodyStructure {
    pub fn is_multipart(&self) -> bool {
        "multipart" == self.content_type.0
    }

    pub fn is_text(&self) -> bool {
        "text" == self.content_type.0
    }
}

/// Build the `BODYSTRUCTURE` of `message`.
///
/// This mirrors the layout `ParsedMessage::serialize()` produces, so sizes
/// and part numbers agree with what section fetches return. In particular,
/// the body `multipart/alternative` always has at least one child.
pub fn build_body_structure(
    message: &ParsedMessage,
    extended: bool,
) -> BodyStructure {
    from_node(&message.mime_tree(), extended)
}

fn from_node(node: &MimeNode, extended: bool) -> BodyStructure {
    match *node {
        MimeNode::Multipart(ref mp) => {
            let mut content = Vec::new();
            node.write_content(&mut content);

            BodyStructure {
                content_type: ("multipart".to_owned(), mp.subtype.to_owned()),
                content_type_parms: vec![(
                    "boundary".to_owned(),
                    mp.boundary.clone(),
                )],
                content_disposition: None,
                content_disposition_parms: vec![],
                content_transfer_encoding: String::new(),
                size_octets: content.len() as u64,
                size_lines: count_lines(&content),
                extended,
                children: mp
                    .children
                    .iter()
                    .map(|child| from_node(child, extended))
                    .collect(),
            }
        }

        MimeNode::Leaf(ref leaf) => {
            let (content_disposition, content_disposition_parms) =
                match leaf.disposition {
                    Some((ref disposition, ref parms)) => {
                        (Some(disposition.clone()), parms.clone())
                    }
                    None => (None, vec![]),
                };

            BodyStructure {
                content_type: leaf.media_type.clone(),
                content_type_parms: leaf.content_type_parms.clone(),
                content_disposition,
                content_disposition_parms,
                content_transfer_encoding: leaf
                    .content_transfer_encoding
                    .to_owned(),
                size_octets: leaf.body.len() as u64,
                size_lines: count_lines(&leaf.body),
                extended,
                children: vec![],
            }
        }
    }
}

/// Count lines the way the size-lines field reports them: one more than the
/// number of line feeds, or zero for empty content.
fn count_lines(content: &[u8]) -> u64 {
    if content.is_empty() {
        0
    } else {
        memchr::memchr_iter(b'\n', content).count() as u64 + 1
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mime::message::Attachment;
    use crate::test_data::*;

    fn types(bs: &BodyStructure) -> (&str, &str) {
        (&bs.content_type.0, &bs.content_type.1)
    }

    #[test]
    fn empty_message_has_placeholder_child() {
        let bs = build_body_structure(&ParsedMessage::default(), false);
        assert_eq!(("multipart", "alternative"), types(&bs));
        assert_eq!(1, bs.children.len());

        let placeholder = &bs.children[0];
        assert_eq!(("text", "plain"), types(placeholder));
        assert_eq!(0, placeholder.size_octets);
        assert_eq!(0, placeholder.size_lines);
        assert!(placeholder.children.is_empty());
    }

    #[test]
    fn headers_only_message_has_placeholder_child() {
        let message = ParsedMessage::parse(NO_BODY).unwrap();
        let bs = build_body_structure(&message, true);
        assert_eq!(("multipart", "alternative"), types(&bs));
        assert_eq!(1, bs.children.len());
        assert_eq!(("text", "plain"), types(&bs.children[0]));
    }

    #[test]
    fn text_and_html_alternative() {
        let message = ParsedMessage {
            text: Some("one\ntwo\nthree".to_owned()),
            html: Some("<p>one</p>".to_owned()),
            ..ParsedMessage::default()
        };
        let bs = build_body_structure(&message, false);
        assert_eq!(("multipart", "alternative"), types(&bs));
        assert_eq!(2, bs.children.len());

        let text = &bs.children[0];
        assert_eq!(("text", "plain"), types(text));
        assert_eq!(13, text.size_octets);
        assert_eq!(3, text.size_lines);
        assert_eq!("8bit", text.content_transfer_encoding);
        assert_eq!(
            vec![("charset".to_owned(), "utf-8".to_owned())],
            text.content_type_parms
        );

        let html = &bs.children[1];
        assert_eq!(("text", "html"), types(html));
        assert_eq!(1, html.size_lines);
        assert!(!html.extended);
    }

    #[test]
    fn html_only_has_single_child() {
        let message = ParsedMessage::parse(HTML_ONLY).unwrap();
        let bs = build_body_structure(&message, false);
        assert_eq!(("multipart", "alternative"), types(&bs));
        assert_eq!(1, bs.children.len());
        assert_eq!(("text", "html"), types(&bs.children[0]));
    }

    #[test]
    fn attachments_are_wrapped_in_mixed() {
        let message = ParsedMessage::parse(WITH_ATTACHMENT).unwrap();
        let bs = build_body_structure(&message, true);
        assert_eq!(("multipart", "mixed"), types(&bs));
        assert!(bs.extended);
        assert_eq!(2, bs.children.len());
        assert_eq!(("multipart", "alternative"), types(&bs.children[0]));
        assert_eq!(2, bs.children[0].children.len());

        let att = &bs.children[1];
        assert_eq!(("application", "pdf"), types(att));
        assert!(att.extended);
        assert_eq!("base64", att.content_transfer_encoding);
        assert_eq!(
            vec![("name".to_owned(), "report.pdf".to_owned())],
            att.content_type_parms
        );
        assert_eq!(Some("attachment"), att.content_disposition.as_deref());
        assert_eq!(
            vec![("filename".to_owned(), "report.pdf".to_owned())],
            att.content_disposition_parms
        );
        assert_eq!(
            base64::encode("%PDF-1.4 fake").len() as u64,
            att.size_octets
        );
    }

    #[test]
    fn missing_content_type_defaults_to_octet_stream() {
        let message = ParsedMessage {
            attachments: vec![Attachment {
                filename: "blob".to_owned(),
                content_type: String::new(),
                content: vec![0, 1, 2],
            }],
            ..ParsedMessage::default()
        };
        let bs = build_body_structure(&message, false);
        assert_eq!(("application", "octet-stream"), types(&bs.children[1]));
        // The body alternative still gets its placeholder.
        assert_eq!(1, bs.children[0].children.len());
    }

    #[test]
    fn sizes_match_sections() {
        let message = ParsedMessage::parse(WITH_ATTACHMENT).unwrap();
        let bs = build_body_structure(&message, false);
        assert_eq!(
            message.resolve_part(&[1, 1]).unwrap().len() as u64,
            bs.children[0].children[0].size_octets
        );
        assert_eq!(
            message.resolve_part(&[2]).unwrap().len() as u64,
            bs.children[1].size_octets
        );
    }
}
