//! Tree builder: an insertion-mode state machine that turns the token stream
//! into a whitelisted, structurally repaired document tree.
//!
//! The builder keeps a stack of open elements and a list of active formatting
//! elements. Disallowed elements are dropped but stay transparent (their
//! content is processed as if the tags were not there), table structure is
//! repaired by synthesizing the missing `tbody`/`tr`/`colgroup` containers,
//! and formatting elements are reconstructed when character data shows up
//! after their block was forcibly closed.
use crate::document::Document;
use crate::node::{Node, NodeData, NodeId};
use crate::tokenizer::{Token, Tokenizer};
use crate::whitelist;
use lazy_static::lazy_static;
use log::{trace, warn};
use regex::Regex;

/// Tags closed implicitly when a block ends.
const IMPLIED_END_TAGS: &[&str] = &["p", "li"];

lazy_static! {
    /// A blank line (with optional horizontal whitespace) splits character
    /// data into separate paragraphs.
    static ref PARAGRAPH_BREAK: Regex = Regex::new(r"\n\s*\n").expect("valid regex");
}

/// Insertion modes. `InBody` is the initial mode; the others are entered
/// while building table structure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InsertionMode {
    InBody,
    InTable,
    InCaption,
    InColumnGroup,
    InTableBody,
    InRow,
    InCell,
}

/// Entry in the list of active formatting elements. Markers are pushed when
/// entering a caption or cell so reconstruction never leaks across table
/// boundaries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ActiveElement {
    Node(NodeId),
    Marker,
}

/// Knobs for the purifier.
#[derive(Clone, Copy, Debug, Default)]
pub struct PurifierOptions {
    /// Keep `h1`..`h6` as block elements instead of degrading every heading
    /// to a `p` + `strong` pair. `h7` is not real and always degrades.
    pub allow_headings: bool,
}

pub struct Purifier<'input> {
    tokenizer: Tokenizer<'input>,
    document: Document,
    open_elements: Vec<NodeId>,
    active_formatting_elements: Vec<ActiveElement>,
    options: PurifierOptions,
}

impl<'input> Purifier<'input> {
    pub fn new(input: &'input str, options: PurifierOptions) -> Self {
        Self {
            tokenizer: Tokenizer::new(input),
            document: Document::new(),
            open_elements: vec![],
            active_formatting_elements: vec![],
            options,
        }
    }

    /// Runs the tokenizer to completion and returns the purified tree.
    /// A tokenizer failure stops consumption; the tree built so far is kept.
    pub fn parse(mut self) -> Document {
        // Leading character data belongs to a paragraph, so one is open from
        // the start. It is pruned again if nothing ends up inside.
        let paragraph = self
            .document
            .add_node(Node::new_element("p", vec![]), NodeId::root());
        self.open_elements.push(NodeId::root());
        self.open_elements.push(paragraph);

        let mut mode = InsertionMode::InBody;
        loop {
            let token = self.tokenizer.next_token();
            if token.is_eof() {
                if let Some(error) = self.tokenizer.error() {
                    warn!("tokenizer stopped early, keeping partial tree: {error}");
                }
                break;
            }
            trace!("{mode:?}: {token:?}");
            mode = self.dispatch(mode, &token);
        }

        self.prune_empty_children(NodeId::root());
        self.document
    }

    /// Processes one token in the given mode and returns the mode for the
    /// next token. Reprocessing a token in another mode is a recursive call.
    fn dispatch(&mut self, mode: InsertionMode, token: &Token) -> InsertionMode {
        match mode {
            InsertionMode::InBody => self.handle_in_body(token, mode),
            InsertionMode::InTable => self.handle_in_table(token, mode),
            InsertionMode::InCaption => self.handle_in_caption(token),
            InsertionMode::InColumnGroup => self.handle_in_column_group(token),
            InsertionMode::InTableBody => self.handle_in_table_body(token),
            InsertionMode::InRow => self.handle_in_row(token),
            InsertionMode::InCell => self.handle_in_cell(token),
        }
    }

    // ------------------------------------------------------------------
    // In body

    /// Body rules. Also the fallback for anything the table modes do not
    /// claim, which is why the entry mode is threaded through and returned.
    fn handle_in_body(&mut self, token: &Token, mode: InsertionMode) -> InsertionMode {
        match token {
            Token::Text { value } => {
                self.handle_text(value, mode);
                mode
            }
            Token::Comment { .. } | Token::Eof => mode,
            Token::StartTag {
                name,
                attributes,
                is_self_closing,
            } => self.body_start_tag(name, attributes, *is_self_closing, mode),
            Token::EndTag { name } => {
                self.body_end_tag(name);
                mode
            }
        }
    }

    fn body_start_tag(
        &mut self,
        raw_name: &str,
        attributes: &[(String, String)],
        is_self_closing: bool,
        mode: InsertionMode,
    ) -> InsertionMode {
        if self.heading_degrades(raw_name) {
            self.body_start_tag("p", &[], false, mode);
            self.body_start_tag("strong", &[], false, mode);
            return mode;
        }

        let Some((name, policy)) = whitelist::resolve(raw_name) else {
            trace!("dropping disallowed element <{raw_name}>");
            return mode;
        };

        if name == "table" {
            if self.in_scope("p") {
                self.close_paragraph();
            }
            self.insert_element(name, attributes.to_vec());
            return InsertionMode::InTable;
        }

        // Rows, cells and sections mean nothing outside a table.
        if whitelist::is_table_structure(name) {
            trace!("ignoring <{name}> start tag outside table context");
            return mode;
        }

        if name == "br" {
            self.handle_break();
            return mode;
        }

        if policy.void {
            if policy.inline {
                self.reconstruct_formatting();
            } else if self.in_scope("p") {
                // hr is block flow: it closes the paragraph it interrupts
                self.close_paragraph();
            }
            self.insert_void_element(name, attributes.to_vec());
            return mode;
        }

        if whitelist::is_formatting(name) {
            if name == "a" && self.in_scope("a") {
                trace!("new <a> implicitly closes the open one");
                self.body_end_tag("a");
            }
            self.reconstruct_formatting();
            let id = self.insert_element(name, attributes.to_vec());
            self.active_formatting_elements.push(ActiveElement::Node(id));
            if is_self_closing {
                self.body_end_tag(name);
            }
            return mode;
        }

        // Block content
        if name == "li" && self.in_scope("li") {
            self.generate_implied_end_tags(None);
            if self.current_name() == "li" {
                self.pop_and_prune();
            }
        }
        if self.in_scope("p") {
            self.close_paragraph();
        }
        self.insert_element(name, attributes.to_vec());
        if is_self_closing {
            self.body_end_tag(name);
        }
        mode
    }

    fn body_end_tag(&mut self, raw_name: &str) {
        if self.heading_degrades(raw_name) {
            self.body_end_tag("strong");
            self.body_end_tag("p");
            return;
        }

        let Some((name, policy)) = whitelist::resolve(raw_name) else {
            return;
        };

        // </br> is meaningless, and stray table end tags never close body
        // content.
        if policy.void || whitelist::is_table_structure(name) {
            return;
        }

        if !self.in_scope(name) {
            trace!("ignoring stray </{name}>");
            return;
        }

        if name == "p" {
            self.close_paragraph();
            return;
        }

        self.generate_implied_end_tags(Some(name));
        if self.current_name() != name {
            trace!(
                "abandoning </{name}>: <{}> is still open",
                self.current_name()
            );
            return;
        }
        if let Some(id) = self.pop_current() {
            if whitelist::is_formatting(name) {
                self.remove_formatting_entry(id);
            }
            self.prune_if_empty(id);
        }
    }

    /// Character data. A run containing blank lines is split into paragraph
    /// chunks; whitespace collapses to single spaces either way.
    fn handle_text(&mut self, value: &str, mode: InsertionMode) {
        let normalized = value.replace("\r\n", "\n").replace('\r', "\n");
        let parts: Vec<&str> = PARAGRAPH_BREAK
            .split(&normalized)
            .filter(|part| !part.trim().is_empty())
            .collect();

        match parts.len() {
            0 => {
                // Whitespace only. Indentation after a break would otherwise
                // reappear as a stray space.
                if normalized.is_empty() || self.last_child_is("br") {
                    return;
                }
                self.append_text(" ");
            }
            1 => {
                self.reconstruct_formatting();
                self.append_text(&collapse_whitespace(parts[0]));
            }
            _ => {
                for part in parts {
                    self.body_start_tag("p", &[], false, mode);
                    self.reconstruct_formatting();
                    self.append_text(&collapse_whitespace(part));
                    self.body_end_tag("p");
                }
            }
        }
    }

    /// `<br>` handling: dropped while its container is still empty, and a
    /// break directly after another break starts a new paragraph instead.
    fn handle_break(&mut self) {
        let current = self.current_node_id();
        if self.document.is_empty_node(current) {
            trace!("dropping line break in empty container");
            return;
        }
        if self.last_child_is("br") {
            self.body_start_tag("p", &[], false, InsertionMode::InBody);
            return;
        }
        self.reconstruct_formatting();
        self.insert_void_element("br", vec![]);
    }

    fn heading_degrades(&self, name: &str) -> bool {
        whitelist::is_heading(name) && (!self.options.allow_headings || name == "h7")
    }

    // ------------------------------------------------------------------
    // In table

    fn handle_in_table(&mut self, token: &Token, mode: InsertionMode) -> InsertionMode {
        match token {
            Token::StartTag {
                name, attributes, ..
            } => match name.as_str() {
                "caption" => {
                    self.clear_stack_back_to_table_context();
                    self.active_formatting_elements.push(ActiveElement::Marker);
                    self.insert_element("caption", attributes.to_vec());
                    InsertionMode::InCaption
                }
                "colgroup" => {
                    self.clear_stack_back_to_table_context();
                    self.insert_element("colgroup", attributes.to_vec());
                    InsertionMode::InColumnGroup
                }
                "col" => {
                    self.clear_stack_back_to_table_context();
                    self.insert_element("colgroup", vec![]);
                    self.dispatch(InsertionMode::InColumnGroup, token)
                }
                "tbody" | "thead" | "tfoot" => {
                    self.clear_stack_back_to_table_context();
                    self.insert_element(name, attributes.to_vec());
                    InsertionMode::InTableBody
                }
                "td" | "th" | "tr" => {
                    self.clear_stack_back_to_table_context();
                    self.insert_element("tbody", vec![]);
                    self.dispatch(InsertionMode::InTableBody, token)
                }
                "table" => {
                    // A nested table start closes the current table first.
                    if self.in_scope("table") {
                        self.pop_until_popped("table");
                        let next = self.reset_insertion_mode();
                        self.dispatch(next, token)
                    } else {
                        mode
                    }
                }
                _ => self.handle_in_body(token, mode),
            },
            Token::EndTag { name } => match name.as_str() {
                "table" => {
                    if !self.in_scope("table") {
                        trace!("ignoring </table> with no open table");
                        return mode;
                    }
                    self.pop_until_popped("table");
                    self.reset_insertion_mode()
                }
                "body" | "caption" | "col" | "colgroup" | "tbody" | "td" | "tfoot" | "th"
                | "thead" | "tr" => mode,
                _ => self.handle_in_body(token, mode),
            },
            _ => self.handle_in_body(token, mode),
        }
    }

    fn handle_in_caption(&mut self, token: &Token) -> InsertionMode {
        const MODE: InsertionMode = InsertionMode::InCaption;
        let reprocess = match token {
            Token::EndTag { name } if name == "caption" => false,
            Token::EndTag { name } if name == "table" => true,
            Token::StartTag { name, .. }
                if matches!(
                    name.as_str(),
                    "caption" | "col" | "colgroup" | "tbody" | "td" | "tfoot" | "th" | "thead"
                        | "tr"
                ) =>
            {
                true
            }
            Token::EndTag { name }
                if matches!(
                    name.as_str(),
                    "body" | "col" | "colgroup" | "tbody" | "td" | "tfoot" | "th" | "thead"
                        | "tr"
                ) =>
            {
                return MODE;
            }
            _ => return self.handle_in_body(token, MODE),
        };

        if !self.in_table_scope("caption") {
            return MODE;
        }
        self.generate_implied_end_tags(None);
        if self.current_name() != "caption" {
            trace!(
                "closing caption with <{}> still open",
                self.current_name()
            );
        }
        self.pop_until_popped("caption");
        self.clear_formatting_to_marker();
        if reprocess {
            self.dispatch(InsertionMode::InTable, token)
        } else {
            InsertionMode::InTable
        }
    }

    fn handle_in_column_group(&mut self, token: &Token) -> InsertionMode {
        const MODE: InsertionMode = InsertionMode::InColumnGroup;
        match token {
            Token::Text { value } if value.trim().is_empty() => MODE,
            Token::Comment { .. } => MODE,
            Token::StartTag {
                name, attributes, ..
            } if name == "col" => {
                self.insert_void_element("col", attributes.to_vec());
                MODE
            }
            Token::EndTag { name } if name == "colgroup" => {
                if self.current_name() == "colgroup" {
                    self.pop_and_prune();
                    InsertionMode::InTable
                } else {
                    MODE
                }
            }
            Token::EndTag { name } if name == "col" => MODE,
            _ => {
                if self.current_name() == "colgroup" {
                    self.pop_and_prune();
                    self.dispatch(InsertionMode::InTable, token)
                } else {
                    MODE
                }
            }
        }
    }

    fn handle_in_table_body(&mut self, token: &Token) -> InsertionMode {
        const MODE: InsertionMode = InsertionMode::InTableBody;
        match token {
            Token::StartTag {
                name, attributes, ..
            } => match name.as_str() {
                "tr" => {
                    self.clear_stack_back_to_table_body_context();
                    self.insert_element("tr", attributes.to_vec());
                    InsertionMode::InRow
                }
                "td" | "th" => {
                    self.clear_stack_back_to_table_body_context();
                    self.insert_element("tr", vec![]);
                    self.dispatch(InsertionMode::InRow, token)
                }
                "caption" | "col" | "colgroup" | "tbody" | "tfoot" | "thead" => {
                    if !self.section_in_table_scope() {
                        return MODE;
                    }
                    self.clear_stack_back_to_table_body_context();
                    self.pop_and_prune();
                    self.dispatch(InsertionMode::InTable, token)
                }
                _ => self.handle_in_table(token, MODE),
            },
            Token::EndTag { name } => match name.as_str() {
                "tbody" | "thead" | "tfoot" => {
                    if !self.in_table_scope(name) {
                        return MODE;
                    }
                    self.clear_stack_back_to_table_body_context();
                    self.pop_and_prune();
                    InsertionMode::InTable
                }
                "table" => {
                    if !self.section_in_table_scope() {
                        return MODE;
                    }
                    self.clear_stack_back_to_table_body_context();
                    self.pop_and_prune();
                    self.dispatch(InsertionMode::InTable, token)
                }
                "body" | "caption" | "col" | "colgroup" | "td" | "th" | "tr" => MODE,
                _ => self.handle_in_table(token, MODE),
            },
            _ => self.handle_in_table(token, MODE),
        }
    }

    fn handle_in_row(&mut self, token: &Token) -> InsertionMode {
        const MODE: InsertionMode = InsertionMode::InRow;
        match token {
            Token::StartTag {
                name, attributes, ..
            } => match name.as_str() {
                "td" | "th" => {
                    self.clear_stack_back_to_table_row_context();
                    self.insert_element(name, attributes.to_vec());
                    self.active_formatting_elements.push(ActiveElement::Marker);
                    InsertionMode::InCell
                }
                "caption" | "col" | "colgroup" | "tbody" | "tfoot" | "thead" | "tr" => {
                    if !self.in_table_scope("tr") {
                        return MODE;
                    }
                    self.end_row();
                    self.dispatch(InsertionMode::InTableBody, token)
                }
                _ => self.handle_in_table(token, MODE),
            },
            Token::EndTag { name } => match name.as_str() {
                "tr" => {
                    if !self.in_table_scope("tr") {
                        return MODE;
                    }
                    self.end_row();
                    InsertionMode::InTableBody
                }
                "table" => {
                    if !self.in_table_scope("tr") {
                        return MODE;
                    }
                    self.end_row();
                    self.dispatch(InsertionMode::InTableBody, token)
                }
                "tbody" | "thead" | "tfoot" => {
                    if !self.in_table_scope(name) || !self.in_table_scope("tr") {
                        return MODE;
                    }
                    self.end_row();
                    self.dispatch(InsertionMode::InTableBody, token)
                }
                "body" | "caption" | "col" | "colgroup" | "td" | "th" => MODE,
                _ => self.handle_in_table(token, MODE),
            },
            _ => self.handle_in_table(token, MODE),
        }
    }

    fn handle_in_cell(&mut self, token: &Token) -> InsertionMode {
        const MODE: InsertionMode = InsertionMode::InCell;
        match token {
            Token::EndTag { name } if name == "td" || name == "th" => {
                if !self.in_table_scope(name) {
                    return MODE;
                }
                self.generate_implied_end_tags(None);
                if self.current_name() != name {
                    trace!("closing cell with <{}> still open", self.current_name());
                }
                self.pop_until_popped(name);
                self.clear_formatting_to_marker();
                InsertionMode::InRow
            }
            Token::StartTag { name, .. }
                if matches!(
                    name.as_str(),
                    "caption" | "col" | "colgroup" | "tbody" | "td" | "tfoot" | "th" | "thead"
                        | "tr"
                ) =>
            {
                if !self.in_table_scope("td") && !self.in_table_scope("th") {
                    return MODE;
                }
                self.close_cell();
                self.dispatch(InsertionMode::InRow, token)
            }
            Token::EndTag { name }
                if matches!(name.as_str(), "body" | "caption" | "col" | "colgroup") =>
            {
                MODE
            }
            Token::EndTag { name }
                if matches!(name.as_str(), "table" | "tbody" | "tfoot" | "thead" | "tr") =>
            {
                if !self.in_table_scope(name) {
                    return MODE;
                }
                self.close_cell();
                self.dispatch(InsertionMode::InRow, token)
            }
            _ => self.handle_in_body(token, MODE),
        }
    }

    // ------------------------------------------------------------------
    // Stack and scope

    fn current_node_id(&self) -> NodeId {
        self.open_elements.last().copied().unwrap_or(NodeId::root())
    }

    fn current_name(&self) -> &str {
        self.open_elements
            .last()
            .and_then(|&id| self.document.get_node_by_id(id))
            .map(|node| node.name.as_str())
            .unwrap_or("")
    }

    fn node_name(&self, id: NodeId) -> String {
        self.document
            .get_node_by_id(id)
            .map(|node| node.name.clone())
            .unwrap_or_default()
    }

    fn in_scope(&self, tag: &str) -> bool {
        self.open_elements
            .iter()
            .any(|&id| self.document.get_node_by_id(id).is_some_and(|n| n.name == tag))
    }

    /// Like [`in_scope`](Self::in_scope) but bounded by the nearest table.
    fn in_table_scope(&self, tag: &str) -> bool {
        for &id in self.open_elements.iter().rev() {
            let Some(node) = self.document.get_node_by_id(id) else {
                continue;
            };
            if node.name == tag {
                return true;
            }
            if node.name == "table" {
                return false;
            }
        }
        false
    }

    fn section_in_table_scope(&self) -> bool {
        self.in_table_scope("tbody") || self.in_table_scope("thead") || self.in_table_scope("tfoot")
    }

    /// Pops the current node unless it is the root.
    fn pop_current(&mut self) -> Option<NodeId> {
        if self.open_elements.len() <= 1 {
            return None;
        }
        self.open_elements.pop()
    }

    fn pop_and_prune(&mut self) {
        if let Some(id) = self.pop_current() {
            self.prune_if_empty(id);
        }
    }

    /// Removes a closed element again if nothing renderable ended up inside.
    fn prune_if_empty(&mut self, id: NodeId) {
        if !self.document.is_empty_node(id) {
            return;
        }
        self.document.remove_node(id);
        let document = &self.document;
        self.active_formatting_elements.retain(|entry| match entry {
            ActiveElement::Node(node_id) => document.get_node_by_id(*node_id).is_some(),
            ActiveElement::Marker => true,
        });
    }

    /// Pops until an element with the given name has been popped.
    fn pop_until_popped(&mut self, tag: &str) {
        while let Some(id) = self.pop_current() {
            let name = self.node_name(id);
            self.prune_if_empty(id);
            if name == tag {
                return;
            }
        }
    }

    fn clear_stack_back_to_table_context(&mut self) {
        self.clear_stack_back_to(&["table"]);
    }

    fn clear_stack_back_to_table_body_context(&mut self) {
        self.clear_stack_back_to(&["tbody", "thead", "tfoot"]);
    }

    fn clear_stack_back_to_table_row_context(&mut self) {
        self.clear_stack_back_to(&["tr"]);
    }

    fn clear_stack_back_to(&mut self, context: &[&str]) {
        while self.open_elements.len() > 1 {
            if context.contains(&self.current_name()) {
                return;
            }
            self.pop_and_prune();
        }
    }

    fn generate_implied_end_tags(&mut self, except: Option<&str>) {
        while self.open_elements.len() > 1 {
            let name = self.current_name().to_string();
            if !IMPLIED_END_TAGS.contains(&name.as_str()) || except == Some(name.as_str()) {
                return;
            }
            self.pop_and_prune();
        }
    }

    /// Closes the open paragraph, popping through any formatting elements
    /// left open inside it. Their entries stay in the active formatting list
    /// so they are reconstructed when more character data arrives.
    fn close_paragraph(&mut self) {
        self.generate_implied_end_tags(Some("p"));
        if self.current_name() != "p" {
            trace!(
                "closing paragraph with <{}> still open",
                self.current_name()
            );
        }
        while let Some(id) = self.pop_current() {
            let name = self.node_name(id);
            self.prune_if_empty(id);
            if name == "p" {
                return;
            }
        }
    }

    /// Pops back to the nearest cell. Anything still open inside it is
    /// closed along the way.
    fn close_cell(&mut self) {
        self.generate_implied_end_tags(None);
        let current = self.current_name().to_string();
        if current != "td" && current != "th" {
            warn!("closing cell while <{current}> is still open");
        }
        while let Some(id) = self.pop_current() {
            let name = self.node_name(id);
            self.prune_if_empty(id);
            if name == "td" || name == "th" {
                break;
            }
        }
        self.clear_formatting_to_marker();
    }

    fn end_row(&mut self) {
        self.clear_stack_back_to_table_row_context();
        self.pop_and_prune();
    }

    /// Which mode fits the current stack. Used after a table is popped.
    fn reset_insertion_mode(&self) -> InsertionMode {
        for (idx, &id) in self.open_elements.iter().enumerate().rev() {
            let last = idx == 0;
            let Some(node) = self.document.get_node_by_id(id) else {
                continue;
            };
            match node.name.as_str() {
                "td" | "th" if !last => return InsertionMode::InCell,
                "tr" => return InsertionMode::InRow,
                "tbody" | "thead" | "tfoot" => return InsertionMode::InTableBody,
                "caption" => return InsertionMode::InCaption,
                "colgroup" => return InsertionMode::InColumnGroup,
                "table" => return InsertionMode::InTable,
                _ => {}
            }
        }
        InsertionMode::InBody
    }

    // ------------------------------------------------------------------
    // Active formatting elements

    fn remove_formatting_entry(&mut self, id: NodeId) {
        if let Some(pos) = self
            .active_formatting_elements
            .iter()
            .rposition(|entry| *entry == ActiveElement::Node(id))
        {
            self.active_formatting_elements.remove(pos);
        }
    }

    fn clear_formatting_to_marker(&mut self) {
        while let Some(entry) = self.active_formatting_elements.pop() {
            if entry == ActiveElement::Marker {
                return;
            }
        }
    }

    /// Reopens formatting elements whose entries are still active but whose
    /// nodes are no longer on the stack, cloning them at the current
    /// insertion point.
    fn reconstruct_formatting(&mut self) {
        let Some(last) = self.active_formatting_elements.last() else {
            return;
        };
        match last {
            ActiveElement::Marker => return,
            ActiveElement::Node(id) => {
                if self.open_elements.contains(id) {
                    return;
                }
            }
        }

        // Rewind to the first entry that needs reopening.
        let mut index = self.active_formatting_elements.len() - 1;
        loop {
            match self.active_formatting_elements[index] {
                ActiveElement::Marker => {
                    index += 1;
                    break;
                }
                ActiveElement::Node(id) => {
                    if self.open_elements.contains(&id) {
                        index += 1;
                        break;
                    }
                }
            }
            if index == 0 {
                break;
            }
            index -= 1;
        }

        while index < self.active_formatting_elements.len() {
            let ActiveElement::Node(id) = self.active_formatting_elements[index] else {
                index += 1;
                continue;
            };
            let Some(clone) = self
                .document
                .get_node_by_id(id)
                .map(|node| node.cloned_element())
            else {
                // The element was pruned away; the entry is stale.
                self.active_formatting_elements.remove(index);
                continue;
            };
            let parent = self.current_node_id();
            let new_id = self.document.add_node(clone, parent);
            self.open_elements.push(new_id);
            self.active_formatting_elements[index] = ActiveElement::Node(new_id);
            index += 1;
        }
    }

    // ------------------------------------------------------------------
    // Insertion

    fn insert_element(&mut self, name: &str, attributes: Vec<(String, String)>) -> NodeId {
        let parent = self.current_node_id();
        let id = self
            .document
            .add_node(Node::new_element(name, attributes), parent);
        self.open_elements.push(id);
        id
    }

    fn insert_void_element(&mut self, name: &str, attributes: Vec<(String, String)>) -> NodeId {
        let parent = self.current_node_id();
        self.document
            .add_node(Node::new_element(name, attributes), parent)
    }

    /// Appends character data, merging with a trailing text sibling.
    fn append_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let parent = self.current_node_id();
        let last_text = self
            .document
            .last_child_of(parent)
            .filter(|node| node.is_text())
            .map(|node| node.id);

        if let Some(last_id) = last_text {
            if let Some(node) = self.document.get_mut_node_by_id(last_id) {
                if let NodeData::Text { value } = &mut node.data {
                    if value.ends_with(' ') && text.starts_with(' ') {
                        value.push_str(text.trim_start());
                    } else {
                        value.push_str(text);
                    }
                    return;
                }
            }
        }
        self.document.add_node(Node::new_text(text), parent);
    }

    fn last_child_is(&self, name: &str) -> bool {
        self.document
            .last_child_of(self.current_node_id())
            .is_some_and(|node| node.is_element() && node.name == name)
    }

    /// Final sweep: drop any element subtree that still renders as nothing.
    fn prune_empty_children(&mut self, id: NodeId) {
        let Some(node) = self.document.get_node_by_id(id) else {
            return;
        };
        let children = node.children.clone();
        for child in children {
            let is_element = self
                .document
                .get_node_by_id(child)
                .is_some_and(|node| node.is_element());
            if is_element && self.document.is_empty_node(child) {
                self.document.remove_node(child);
            } else {
                self.prune_empty_children(child);
            }
        }
    }
}

/// Collapses runs of whitespace (including non-breaking spaces and newlines)
/// to single spaces.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_whitespace = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push(' ');
                in_whitespace = true;
            }
        } else {
            out.push(ch);
            in_whitespace = false;
        }
    }
    out
}
