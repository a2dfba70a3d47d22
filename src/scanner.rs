//! Incremental Catalog Scanner
//!
//! Reads the tool's XML listing one token at a time. Everything outside a
//! `<table>` element is skipped; each table subtree is decoded into a
//! [`Table`] and handed back before the next token is read, so memory is
//! bounded by the largest single table rather than the whole catalog.
//!
//! Scanning ends at the closing `</taginfo>` tag, at end of input, or at the
//! first tokenizer error. None of these are surfaced as failures to the
//! caller: [`CatalogScanner::next_table`] simply returns `None` and the
//! reason is available from [`CatalogScanner::termination`].

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tokio::io::AsyncBufRead;

use crate::catalog::{Description, Table, Tag, parse_flag};
use crate::error::ScanError;

const CATALOG_ELEMENT: &[u8] = b"taginfo";
const TABLE_ELEMENT: &[u8] = b"table";
const TAG_ELEMENT: &[u8] = b"tag";
const DESC_ELEMENT: &[u8] = b"desc";

/// Why scanning stopped
#[derive(Debug)]
pub enum Termination {
    /// The closing catalog tag was read
    EndOfDocument,
    /// Input ran out outside of any table
    EndOfInput,
    /// The tokenizer failed or input ended inside a table
    Malformed(ScanError),
}

impl Termination {
    pub fn is_clean(&self) -> bool {
        matches!(self, Termination::EndOfDocument)
    }
}

enum Token {
    Table(Result<String, ScanError>),
    CatalogEnd,
    Eof,
    Other,
    Failed(ScanError),
}

enum TableToken {
    TagStart(Result<Tag, ScanError>),
    DescStart(Result<String, ScanError>),
    Text(Result<String, ScanError>),
    End,
    Eof,
    Ignored,
    Failed(ScanError),
}

/// Pull-based scanner yielding one decoded table at a time
pub struct CatalogScanner<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    termination: Option<Termination>,
    tables: usize,
}

impl<R: AsyncBufRead + Unpin> CatalogScanner<R> {
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        // `<tag .../>` then behaves exactly like `<tag ...></tag>`
        reader.config_mut().expand_empty_elements = true;

        Self {
            reader,
            buf: Vec::new(),
            termination: None,
            tables: 0,
        }
    }

    /// Advance to the next table, or `None` once scanning is done.
    ///
    /// A table interrupted by malformed or truncated input is still returned
    /// with the tags that were complete; the following call returns `None`.
    pub async fn next_table(&mut self) -> Option<Table> {
        while self.termination.is_none() {
            self.buf.clear();
            let token = match self.reader.read_event_into_async(&mut self.buf).await {
                Ok(Event::Start(start)) if start.local_name().as_ref() == TABLE_ELEMENT => {
                    Token::Table(attribute(&start, b"name"))
                }
                Ok(Event::End(end)) if end.local_name().as_ref() == CATALOG_ELEMENT => {
                    Token::CatalogEnd
                }
                Ok(Event::Eof) => Token::Eof,
                Ok(_) => Token::Other,
                Err(err) => Token::Failed(err.into()),
            };

            match token {
                Token::Table(Ok(name)) => return self.decode_table(name).await,
                Token::Table(Err(err)) | Token::Failed(err) => {
                    self.finish(Termination::Malformed(err))
                }
                Token::CatalogEnd => self.finish(Termination::EndOfDocument),
                Token::Eof => self.finish(Termination::EndOfInput),
                Token::Other => {}
            }
        }
        None
    }

    /// Number of tables handed out so far, including a truncated last one
    pub fn tables_scanned(&self) -> usize {
        self.tables
    }

    /// Set once `next_table` has returned `None`
    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    pub fn into_termination(self) -> Option<Termination> {
        self.termination
    }

    fn finish(&mut self, termination: Termination) {
        tracing::debug!(tables = self.tables, ?termination, "catalog scan finished");
        self.termination = Some(termination);
    }

    async fn decode_table(&mut self, name: String) -> Option<Table> {
        let mut table = Table::new(name);
        // Depth below the <table> element; 1 is a direct child.
        let mut depth = 0usize;
        let mut tag: Option<Tag> = None;
        let mut desc: Option<Description> = None;

        loop {
            self.buf.clear();
            let collecting = desc.is_some() && depth == 2;
            let token = match self.reader.read_event_into_async(&mut self.buf).await {
                Ok(Event::Start(start)) => {
                    depth += 1;
                    match (depth, start.local_name().as_ref()) {
                        (1, TAG_ELEMENT) => TableToken::TagStart(decode_tag(&start)),
                        (2, DESC_ELEMENT) if tag.is_some() => {
                            TableToken::DescStart(attribute(&start, b"lang"))
                        }
                        _ => TableToken::Ignored,
                    }
                }
                Ok(Event::Text(text)) if collecting => {
                    TableToken::Text(text.unescape().map(Cow::into_owned).map_err(Into::into))
                }
                Ok(Event::CData(cdata)) if collecting => TableToken::Text(Ok(
                    String::from_utf8_lossy(&cdata.into_inner()).into_owned(),
                )),
                Ok(Event::End(_)) => TableToken::End,
                Ok(Event::Eof) => TableToken::Eof,
                Ok(_) => TableToken::Ignored,
                Err(err) => TableToken::Failed(err.into()),
            };

            match token {
                TableToken::TagStart(Ok(decoded)) => tag = Some(decoded),
                TableToken::DescStart(Ok(lang)) => desc = Some(Description::new(lang, "")),
                TableToken::Text(Ok(chunk)) => {
                    if let Some(open) = desc.as_mut() {
                        open.value.push_str(&chunk);
                    }
                }
                TableToken::End => {
                    match depth {
                        0 => {
                            self.tables += 1;
                            return Some(table);
                        }
                        1 => {
                            if let Some(done) = tag.take() {
                                table.tags.push(done);
                            }
                        }
                        2 => {
                            if let (Some(done), Some(owner)) = (desc.take(), tag.as_mut()) {
                                owner.descriptions.push(done);
                            }
                        }
                        _ => {}
                    }
                    depth -= 1;
                }
                TableToken::Ignored => {}
                TableToken::Eof => {
                    let err = ScanError::UnexpectedEof {
                        table: table.name.clone(),
                    };
                    return Some(self.abandon(table, err));
                }
                TableToken::TagStart(Err(err))
                | TableToken::DescStart(Err(err))
                | TableToken::Text(Err(err))
                | TableToken::Failed(err) => return Some(self.abandon(table, err)),
            }
        }
    }

    fn abandon(&mut self, table: Table, err: ScanError) -> Table {
        tracing::warn!(table = %table.name, error = %err, "catalog ended inside a table");
        self.tables += 1;
        self.finish(Termination::Malformed(err));
        table
    }
}

/// Attribute value with entities decoded; a missing attribute is empty.
fn attribute(start: &BytesStart<'_>, key: &[u8]) -> Result<String, ScanError> {
    match start.try_get_attribute(key)? {
        Some(attr) => Ok(attr.unescape_value()?.into_owned()),
        None => Ok(String::new()),
    }
}

fn decode_tag(start: &BytesStart<'_>) -> Result<Tag, ScanError> {
    Ok(Tag {
        name: attribute(start, b"name")?,
        kind: attribute(start, b"type")?,
        writable: parse_flag(&attribute(start, b"writable")?),
        descriptions: Vec::new(),
    })
}
