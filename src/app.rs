use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossterm::{
    cursor::{Hide, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use crate::filter::{apply_filter, visible_rows, Filter, Row, Visibility};
use crate::generator::{clamp_length, generate, Charset};
use crate::models::{build_tree, NodeId, NodeKind, Secret, Tree};
use crate::settings::Settings;
use crate::store::{join_path, normalize, PasswordStore};
use crate::ui::{
    classify_password_strength, clipboard_lifetime_secs, copy_to_clipboard, draw, draw_hidden,
    ContentPane, ViewState,
};

const STATUS_MESSAGE_SECS: u64 = 3;
const NAV_HINT: &str =
    "↑/↓ move | ←/→ fold | Enter open | / filter | c copy | e edit | n new | r rename | d delete | o settings | F5 reload | </> resize | q quit";
const FILTER_HINT: &str = "Filter: type a pattern | Enter keep | Esc clear";
const PAGE_ROWS: usize = 10;

const EDIT_STEP_PASSWORD: usize = 0;
const EDIT_STEP_CHARSET: usize = 1;
const EDIT_STEP_LENGTH: usize = 2;
const EDIT_STEP_INFO: usize = 3;

const CONFIG_ROWS: usize = 6;
const CONFIG_STEP_LENGTH: usize = 5;

type Tui = Terminal<CrosstermBackend<std::io::Stdout>>;

/// What the event loop has to do after a key was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Quit,
    EditInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Browse,
    Filter,
    Hidden,
}

#[derive(Default)]
struct EditForm {
    active: bool,
    creating: bool,
    step: usize,
    path: String,
    secret: Secret,
    charset: Charset,
    length: usize,
    show_password: bool,
}

enum PromptKind {
    Create { folder: String },
    Rename { from: String },
}

struct PathPrompt {
    kind: PromptKind,
    input: String,
}

#[derive(Default)]
struct ConfigForm {
    active: bool,
    step: usize,
    draft: Settings,
}

struct PendingDelete {
    id: NodeId,
    path: String,
    is_dir: bool,
}

pub struct App<'s> {
    store: &'s dyn PasswordStore,
    settings: Settings,
    settings_path: Option<PathBuf>,
    tree: Tree,
    expanded: HashSet<NodeId>,
    filter: Filter,
    visibility: Visibility,
    rows: Vec<Row>,
    selected: usize,
    content: ContentPane,
    reveal: bool,
    mode: Mode,
    status: String,
    status_until: Option<Instant>,
    edit_form: EditForm,
    prompt: Option<PathPrompt>,
    config_form: ConfigForm,
    pending_delete: Option<PendingDelete>,
    quit_overlay: bool,
}

impl<'s> App<'s> {
    pub fn new(store: &'s dyn PasswordStore, settings: Settings) -> Self {
        let tree = build_tree(store);
        let filter = Filter::default();
        let visibility = apply_filter(&tree, &filter);
        let mode = if settings.start_minimized {
            Mode::Hidden
        } else {
            Mode::Browse
        };
        let mut app = Self {
            store,
            settings,
            settings_path: None,
            tree,
            expanded: HashSet::new(),
            filter,
            visibility,
            rows: Vec::new(),
            selected: 0,
            content: ContentPane::Welcome,
            reveal: false,
            mode,
            status: NAV_HINT.to_string(),
            status_until: None,
            edit_form: EditForm::default(),
            prompt: None,
            config_form: ConfigForm::default(),
            pending_delete: None,
            quit_overlay: false,
        };
        app.recompute();
        info!(entries = app.entry_count(), "loaded password tree");
        app
    }

    /// Persist settings to `path` instead of the per-user location.
    pub fn with_settings_path(mut self, path: PathBuf) -> Self {
        self.settings_path = Some(path);
        self
    }

    pub fn is_hidden(&self) -> bool {
        self.mode == Mode::Hidden
    }

    fn entry_count(&self) -> usize {
        self.tree
            .descendants(self.tree.root())
            .into_iter()
            .filter(|id| !self.tree.node(*id).is_dir())
            .count()
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.status_until = Some(Instant::now() + Duration::from_secs(STATUS_MESSAGE_SECS));
    }

    /// Surface a failure to the user without changing any other state.
    pub fn report(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.set_status(message);
    }

    fn idle_hint(&self) -> &'static str {
        if self.mode == Mode::Filter {
            FILTER_HINT
        } else {
            NAV_HINT
        }
    }

    /// Expire transient status messages.
    pub fn tick(&mut self) {
        if let Some(until) = self.status_until {
            if Instant::now() >= until {
                self.status = self.idle_hint().to_string();
                self.status_until = None;
            }
        }
    }

    fn recompute(&mut self) {
        let current = self.selected_id();
        self.visibility = apply_filter(&self.tree, &self.filter);
        self.rows = visible_rows(
            &self.tree,
            &self.visibility,
            &self.expanded,
            self.filter.is_active(),
        );
        match current.and_then(|id| self.rows.iter().position(|r| r.id == id)) {
            Some(pos) => self.selected = pos,
            None => self.selected = self.selected.min(self.rows.len().saturating_sub(1)),
        }
    }

    fn selected_id(&self) -> Option<NodeId> {
        self.rows.get(self.selected).map(|row| row.id)
    }

    fn selected_entry_path(&self) -> Option<String> {
        self.selected_id()
            .filter(|id| !self.tree.node(*id).is_dir())
            .map(|id| self.tree.full_path(id))
    }

    fn select_path(&mut self, path: &str) -> bool {
        match self.tree.find(path) {
            Some(id) => self.select_id(id),
            None => false,
        }
    }

    fn select_kind(&mut self, path: &str, kind: NodeKind) -> bool {
        match self.tree.find_kind(path, kind) {
            Some(id) => self.select_id(id),
            None => false,
        }
    }

    /// Expand the ancestors of `id` and move the cursor onto it.
    fn select_id(&mut self, id: NodeId) -> bool {
        let mut ancestor = self.tree.parent(id);
        while let Some(parent) = ancestor {
            if parent != self.tree.root() {
                self.expanded.insert(parent);
            }
            ancestor = self.tree.parent(parent);
        }
        self.recompute();
        match self.rows.iter().position(|row| row.id == id) {
            Some(pos) => {
                self.selected = pos;
                true
            }
            None => false,
        }
    }

    /// Rebuild the tree from the store, keeping folds and selection by path.
    pub fn refresh(&mut self) {
        let expanded_paths: Vec<String> = self
            .expanded
            .iter()
            .filter(|id| self.tree.is_attached(**id))
            .map(|id| self.tree.full_path(*id))
            .collect();
        let selected = self
            .selected_id()
            .map(|id| (self.tree.full_path(id), self.tree.node(id).kind));

        self.tree = build_tree(self.store);
        self.expanded = expanded_paths
            .iter()
            .filter_map(|path| self.tree.find_kind(path, NodeKind::Directory))
            .collect();
        self.rows.clear();
        self.selected = 0;
        self.recompute();
        if let Some((path, kind)) = selected {
            self.select_kind(&path, kind);
        }
        debug!(entries = self.entry_count(), "refreshed password tree");
    }

    pub fn set_filter(&mut self, pattern: &str) {
        self.filter = Filter::new(pattern);
        self.recompute();
    }

    pub fn open_path(&mut self, path: &str) -> bool {
        match self.store.get_key(path) {
            Ok(mut raw) => {
                let secret = Secret::parse(&raw);
                raw.zeroize();
                self.content = ContentPane::Entry {
                    path: path.to_string(),
                    secret,
                };
                self.reveal = false;
                debug!(path, "opened entry");
                true
            }
            Err(e) if e.is_access_error() => {
                self.report(format!("Cannot retrieve '{path}': {e}"));
                false
            }
            Err(e) => {
                self.report(format!("Error reading '{path}': {e}"));
                false
            }
        }
    }

    /// Enter: open an entry, fold or unfold a folder.
    pub fn open_selected(&mut self) {
        let Some(id) = self.selected_id() else {
            return;
        };
        if self.tree.node(id).is_dir() {
            if !self.expanded.remove(&id) {
                self.expanded.insert(id);
            }
            self.recompute();
        } else {
            let path = self.tree.full_path(id);
            self.open_path(&path);
        }
    }

    fn move_selection(&mut self, delta: isize) {
        if self.rows.is_empty() {
            return;
        }
        let last = self.rows.len() - 1;
        let next = self.selected.saturating_add_signed(delta).min(last);
        if next == self.selected {
            return;
        }
        self.selected = next;
        if self.settings.select_is_open {
            if let Some(path) = self.selected_entry_path() {
                self.open_path(&path);
            }
        }
    }

    fn expand_selected(&mut self) {
        let Some(id) = self.selected_id() else {
            return;
        };
        if self.tree.node(id).is_dir() {
            self.expanded.insert(id);
            self.recompute();
        } else {
            let path = self.tree.full_path(id);
            self.open_path(&path);
        }
    }

    fn collapse_selected(&mut self) {
        let Some(id) = self.selected_id() else {
            return;
        };
        if self.tree.node(id).is_dir() && self.expanded.remove(&id) {
            self.recompute();
            return;
        }
        if let Some(parent) = self.tree.parent(id).filter(|p| *p != self.tree.root()) {
            if let Some(pos) = self.rows.iter().position(|row| row.id == parent) {
                self.selected = pos;
            }
        }
    }

    fn copy_selected(&mut self) {
        let Some(path) = self.selected_entry_path() else {
            self.set_status("Select an entry to copy");
            return;
        };
        let shown = match &self.content {
            ContentPane::Entry { path: shown, secret } if *shown == path => {
                Some(secret.password.clone())
            }
            _ => None,
        };
        let mut password = match shown {
            Some(password) => password,
            None => match self.store.get_key(&path) {
                Ok(mut raw) => {
                    let secret = Secret::parse(&raw);
                    raw.zeroize();
                    secret.password.clone()
                }
                Err(e) => {
                    self.report(format!("Cannot retrieve '{path}': {e}"));
                    return;
                }
            },
        };
        match copy_to_clipboard(&password) {
            Ok(()) => self.set_status(format!(
                "Copied '{path}' password to clipboard for {}s",
                clipboard_lifetime_secs()
            )),
            Err(e) => self.report(format!("Clipboard error: {e}")),
        }
        password.zeroize();
    }

    pub fn begin_edit(&mut self) {
        let Some(path) = self.selected_entry_path() else {
            self.set_status("Select an entry to edit");
            return;
        };
        match self.store.get_key(&path) {
            Ok(mut raw) => {
                self.edit_form = EditForm {
                    active: true,
                    creating: false,
                    step: EDIT_STEP_PASSWORD,
                    path,
                    secret: Secret::parse(&raw),
                    charset: Charset::default(),
                    length: self.settings.password_length,
                    show_password: false,
                };
                raw.zeroize();
            }
            Err(e) => self.report(format!("Cannot retrieve '{path}': {e}")),
        }
    }

    fn begin_create(&mut self) {
        let folder = self
            .selected_id()
            .map(|id| self.tree.containing_folder(id))
            .unwrap_or_else(|| "/".to_string());
        self.prompt = Some(PathPrompt {
            kind: PromptKind::Create { folder },
            input: String::new(),
        });
    }

    /// Open the edit form for a new entry `name` inside `folder`.
    ///
    /// Refuses names that already exist in the store.
    pub fn submit_create(&mut self, folder: &str, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            self.set_status("Name required");
            return false;
        }
        let path = match normalize(&join_path(folder, name)) {
            Ok(path) => path,
            Err(e) => {
                self.report(e.to_string());
                return false;
            }
        };
        if self.store.contains(&path) || self.tree.find(&path).is_some() {
            self.set_status(format!("'{path}' already exists"));
            return false;
        }
        let length = clamp_length(self.settings.password_length);
        self.edit_form = EditForm {
            active: true,
            creating: true,
            step: EDIT_STEP_PASSWORD,
            path,
            secret: Secret {
                password: generate(length, Charset::All),
                info: String::new(),
            },
            charset: Charset::All,
            length,
            show_password: false,
        };
        true
    }

    /// Write the edit form back to the store.
    pub fn save_edit(&mut self) -> bool {
        let path = self.edit_form.path.clone();
        let creating = self.edit_form.creating;
        let mut content = self.edit_form.secret.render();
        let result = self.store.set_key(&path, &content, !creating);
        content.zeroize();
        if let Err(e) = result {
            self.report(format!("Could not save '{path}': {e}"));
            return false;
        }

        info!(path, creating, "saved entry");
        let shown = self.content.path() == Some(path.as_str());
        if creating {
            self.refresh();
            self.select_kind(&path, NodeKind::Entry);
        }
        if creating || shown {
            self.content = ContentPane::Entry {
                path: path.clone(),
                secret: self.edit_form.secret.clone(),
            };
        }
        self.edit_form = EditForm::default();
        self.set_status(if creating {
            format!("Created '{path}'")
        } else {
            format!("Saved '{path}'")
        });
        true
    }

    /// Hand back text from the external editor as the entry's information.
    pub fn finish_info_edit(&mut self, edited: Option<String>) {
        match edited {
            Some(text) => {
                self.edit_form.secret.info.zeroize();
                self.edit_form.secret.info = text;
                self.set_status("Information updated");
            }
            None => self.set_status("Editor exited without changes"),
        }
    }

    pub fn editor_text(&self) -> &str {
        &self.edit_form.secret.info
    }

    fn begin_rename(&mut self) {
        let Some(id) = self.selected_id() else {
            return;
        };
        let path = self.tree.full_path(id);
        let from = if self.tree.node(id).is_dir() {
            format!("{path}/")
        } else {
            path.clone()
        };
        self.prompt = Some(PathPrompt {
            input: path,
            kind: PromptKind::Rename { from },
        });
    }

    /// Move `from` to `to`; a trailing `/` or an existing folder means "into".
    ///
    /// `from` names a folder when it ends with `/`, an entry otherwise.
    pub fn submit_rename(&mut self, from: &str, to: &str) -> bool {
        let to = to.trim();
        let from_dir = from.ends_with('/');
        let kind = if from_dir {
            NodeKind::Directory
        } else {
            NodeKind::Entry
        };
        let (from_n, to_n) = match (normalize(from), normalize(to)) {
            (Ok(f), Ok(t)) => (f, t),
            (Err(e), _) | (_, Err(e)) => {
                self.report(e.to_string());
                return false;
            }
        };
        let into_folder = to.ends_with('/');
        if to_n.is_empty() && !into_folder {
            self.set_status("Destination required");
            return false;
        }
        if from_n == to_n && !into_folder {
            self.set_status("Nothing to rename");
            return true;
        }
        let into_folder =
            into_folder || self.tree.find_kind(&to_n, NodeKind::Directory).is_some();
        let basename = from_n.rsplit('/').next().unwrap_or(&from_n).to_string();
        let dest = if into_folder {
            join_path(&to_n, &basename)
        } else {
            to_n.clone()
        };

        if let Err(e) = self.store.move_path(from, to) {
            self.report(format!("Could not move '{from_n}': {e}"));
            return false;
        }
        info!(from = %from_n, to = %dest, "moved");

        if let ContentPane::Entry { path, .. } = &mut self.content {
            if let Some(moved) = rebase(path, &from_n, &dest, from_dir) {
                *path = moved;
            }
        }
        self.refresh();
        self.select_kind(&dest, kind);
        self.set_status(format!("Moved '{from_n}' to '{dest}'"));
        true
    }

    fn begin_delete(&mut self) {
        let Some(id) = self.selected_id() else {
            return;
        };
        self.pending_delete = Some(PendingDelete {
            id,
            path: self.tree.full_path(id),
            is_dir: self.tree.node(id).is_dir(),
        });
    }

    /// Remove the pending target from the store, then from the tree.
    pub fn confirm_delete(&mut self) -> bool {
        let Some(target) = self.pending_delete.take() else {
            return false;
        };
        let store_path = if target.is_dir {
            format!("{}/", target.path)
        } else {
            target.path.clone()
        };
        if let Err(e) = self.store.remove_path(&store_path, true) {
            self.report(format!("Could not delete '{}': {e}", target.path));
            return false;
        }
        info!(path = %target.path, folder = target.is_dir, "deleted");

        self.tree.remove(target.id);
        let tree = &self.tree;
        self.expanded.retain(|id| tree.is_attached(*id));
        if self
            .content
            .path()
            .is_some_and(|shown| is_affected(shown, &target.path, target.is_dir))
        {
            self.content = ContentPane::Welcome;
        }
        self.recompute();
        self.set_status(format!("Deleted '{}'", target.path));
        true
    }

    fn delete_message(&self) -> Option<String> {
        self.pending_delete.as_ref().map(|target| {
            if target.is_dir {
                format!("Delete folder '{}' and everything in it?", target.path)
            } else {
                format!("Delete '{}'?", target.path)
            }
        })
    }

    fn begin_config(&mut self) {
        self.config_form = ConfigForm {
            active: true,
            step: 0,
            draft: self.settings.clone(),
        };
    }

    pub fn save_config(&mut self) {
        let draft = &self.config_form.draft;
        self.settings.select_is_open = draft.select_is_open;
        self.settings.close_is_hide = draft.close_is_hide;
        self.settings.start_minimized = draft.start_minimized;
        self.settings.use_tray_icon = draft.use_tray_icon;
        self.settings.always_on_top = draft.always_on_top;
        self.settings.password_length = clamp_length(draft.password_length);
        self.config_form = ConfigForm::default();
        match self.persist_settings() {
            Ok(()) => self.set_status("Settings saved"),
            Err(e) => self.report(format!("Could not save settings: {e}")),
        }
    }

    fn persist_settings(&self) -> Result<()> {
        match &self.settings_path {
            Some(path) => self.settings.save_to(path),
            None => self.settings.save(),
        }
    }

    fn request_quit(&mut self) {
        if self.settings.close_is_hide {
            self.hide();
        } else {
            self.quit_overlay = true;
        }
    }

    /// Blank the screen and forget anything decrypted.
    pub fn hide(&mut self) {
        self.content = ContentPane::Welcome;
        self.edit_form = EditForm::default();
        self.prompt = None;
        self.pending_delete = None;
        self.reveal = false;
        self.mode = Mode::Hidden;
        debug!("hidden");
    }

    /// Save settings and drop decrypted data before exit.
    pub fn close(&mut self, terminal_size: Option<(u16, u16)>) {
        if let Some((cols, rows)) = terminal_size {
            self.settings.record_terminal_size(cols, rows);
        }
        if let Err(e) = self.persist_settings() {
            warn!("could not save settings on exit: {e}");
        }
        self.content = ContentPane::Welcome;
        self.edit_form = EditForm::default();
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        if ctrl && matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q')) {
            return Action::Quit;
        }
        let toggle_visibility =
            ctrl && matches!(key.code, KeyCode::Char('h') | KeyCode::Char('H'));

        if self.mode == Mode::Hidden {
            self.mode = Mode::Browse;
            self.set_status("Restored");
            return Action::Continue;
        }
        if self.quit_overlay {
            match key.code {
                KeyCode::Char('y') => return Action::Quit,
                KeyCode::Char('n') | KeyCode::Esc => self.quit_overlay = false,
                _ => {}
            }
            return Action::Continue;
        }
        if self.pending_delete.is_some() {
            match key.code {
                KeyCode::Char('y') => {
                    self.confirm_delete();
                }
                KeyCode::Char('n') | KeyCode::Esc => {
                    self.pending_delete = None;
                    self.set_status("Delete cancelled");
                }
                _ => {}
            }
            return Action::Continue;
        }
        // control chords are never typed into a field
        if ctrl && matches!(key.code, KeyCode::Char(_)) && !toggle_visibility {
            return Action::Continue;
        }
        if self.edit_form.active {
            return self.handle_edit_modal(key.code, toggle_visibility);
        }
        if self.prompt.is_some() {
            if !toggle_visibility {
                self.handle_path_prompt(key.code);
            }
            return Action::Continue;
        }
        if self.config_form.active {
            if !toggle_visibility {
                self.handle_config_modal(key.code);
            }
            return Action::Continue;
        }
        if self.mode == Mode::Filter {
            if !toggle_visibility {
                self.handle_filter_input(key.code);
            }
            return Action::Continue;
        }
        if toggle_visibility {
            self.reveal = !self.reveal;
            self.set_status(if self.reveal {
                "Password visibility: visible"
            } else {
                "Password visibility: hidden"
            });
            return Action::Continue;
        }
        if ctrl {
            return Action::Continue;
        }

        match key.code {
            KeyCode::Esc if self.filter.is_active() => {
                self.set_filter("");
                self.set_status("Filter cleared");
            }
            KeyCode::Esc | KeyCode::Char('q') => self.request_quit(),
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::PageUp => self.move_selection(-(PAGE_ROWS as isize)),
            KeyCode::PageDown => self.move_selection(PAGE_ROWS as isize),
            KeyCode::Home => self.move_selection(isize::MIN / 2),
            KeyCode::End => self.move_selection(isize::MAX / 2),
            KeyCode::Right => self.expand_selected(),
            KeyCode::Left => self.collapse_selected(),
            KeyCode::Enter => self.open_selected(),
            KeyCode::Char('/') => {
                self.mode = Mode::Filter;
                self.status = FILTER_HINT.to_string();
                self.status_until = None;
            }
            KeyCode::Char('c') => self.copy_selected(),
            KeyCode::Char('e') => self.begin_edit(),
            KeyCode::Char('n') => self.begin_create(),
            KeyCode::Char('r') => self.begin_rename(),
            KeyCode::Char('d') => self.begin_delete(),
            KeyCode::Char('o') => self.begin_config(),
            KeyCode::F(5) => {
                self.refresh();
                self.set_status("Reloaded password store");
            }
            KeyCode::Char('<') => self.settings.shift_splitter(-1),
            KeyCode::Char('>') => self.settings.shift_splitter(1),
            _ => {}
        }
        Action::Continue
    }

    fn handle_filter_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Enter => {
                self.mode = Mode::Browse;
                self.status = NAV_HINT.to_string();
            }
            KeyCode::Esc => {
                self.set_filter("");
                self.mode = Mode::Browse;
                self.status = NAV_HINT.to_string();
            }
            KeyCode::Backspace => {
                let mut pattern = self.filter.pattern().to_string();
                pattern.pop();
                self.set_filter(&pattern);
            }
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::Char(c) => {
                let mut pattern = self.filter.pattern().to_string();
                pattern.push(c);
                self.set_filter(&pattern);
            }
            _ => {}
        }
    }

    fn handle_edit_modal(&mut self, key: KeyCode, toggle_visibility: bool) -> Action {
        if toggle_visibility {
            self.edit_form.show_password = !self.edit_form.show_password;
            self.set_status(if self.edit_form.show_password {
                "Password visibility: visible"
            } else {
                "Password visibility: hidden"
            });
            return Action::Continue;
        }

        let step = self.edit_form.step;
        match key {
            KeyCode::Esc => {
                self.edit_form = EditForm::default();
                self.set_status("Edit cancelled");
            }
            KeyCode::Up | KeyCode::BackTab => {
                self.edit_form.step = step.saturating_sub(1);
            }
            KeyCode::Down => {
                self.edit_form.step = (step + 1).min(EDIT_STEP_INFO);
            }
            KeyCode::Tab => {
                let form = &mut self.edit_form;
                form.secret.password.zeroize();
                form.secret.password = generate(form.length, form.charset);
                self.set_status("Generated password");
            }
            KeyCode::Left | KeyCode::Char('-') if step == EDIT_STEP_LENGTH => {
                self.edit_form.length = clamp_length(self.edit_form.length.saturating_sub(1));
            }
            KeyCode::Right | KeyCode::Char('+') if step == EDIT_STEP_LENGTH => {
                self.edit_form.length = clamp_length(self.edit_form.length + 1);
            }
            KeyCode::Left if step == EDIT_STEP_CHARSET => {
                self.edit_form.charset = self.edit_form.charset.prev();
            }
            KeyCode::Right | KeyCode::Char(' ') if step == EDIT_STEP_CHARSET => {
                self.edit_form.charset = self.edit_form.charset.next();
            }
            KeyCode::Right | KeyCode::Char('e') if step == EDIT_STEP_INFO => {
                return Action::EditInfo;
            }
            KeyCode::Backspace if step == EDIT_STEP_PASSWORD => {
                self.edit_form.secret.password.pop();
            }
            KeyCode::Enter => {
                if step < EDIT_STEP_INFO {
                    self.edit_form.step += 1;
                } else if self.edit_form.secret.password.is_empty() {
                    self.set_status("Password required");
                } else {
                    self.save_edit();
                }
            }
            KeyCode::Char(c) if step == EDIT_STEP_PASSWORD => {
                self.edit_form.secret.password.push(c);
            }
            _ => {}
        }
        Action::Continue
    }

    fn handle_path_prompt(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc => {
                self.prompt = None;
                self.set_status("Cancelled");
            }
            KeyCode::Backspace => {
                if let Some(prompt) = self.prompt.as_mut() {
                    prompt.input.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(prompt) = self.prompt.as_mut() {
                    prompt.input.push(c);
                }
            }
            KeyCode::Enter => {
                let Some(prompt) = self.prompt.take() else {
                    return;
                };
                let done = match &prompt.kind {
                    PromptKind::Create { folder } => self.submit_create(folder, &prompt.input),
                    PromptKind::Rename { from } => self.submit_rename(from, &prompt.input),
                };
                if !done {
                    self.prompt = Some(prompt);
                }
            }
            _ => {}
        }
    }

    fn handle_config_modal(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc => {
                self.config_form = ConfigForm::default();
                self.set_status("Settings unchanged");
                return;
            }
            KeyCode::Enter => {
                self.save_config();
                return;
            }
            _ => {}
        }
        let form = &mut self.config_form;
        match key {
            KeyCode::Up | KeyCode::BackTab => form.step = form.step.saturating_sub(1),
            KeyCode::Down | KeyCode::Tab => form.step = (form.step + 1).min(CONFIG_ROWS - 1),
            KeyCode::Left | KeyCode::Char('-') if form.step == CONFIG_STEP_LENGTH => {
                form.draft.password_length = clamp_length(form.draft.password_length.saturating_sub(1));
            }
            KeyCode::Right | KeyCode::Char('+') if form.step == CONFIG_STEP_LENGTH => {
                form.draft.password_length = clamp_length(form.draft.password_length + 1);
            }
            KeyCode::Char(' ') | KeyCode::Left | KeyCode::Right => {
                let draft = &mut form.draft;
                match form.step {
                    0 => draft.select_is_open = !draft.select_is_open,
                    1 => draft.close_is_hide = !draft.close_is_hide,
                    2 => draft.start_minimized = !draft.start_minimized,
                    3 => draft.use_tray_icon = !draft.use_tray_icon,
                    4 => draft.always_on_top = !draft.always_on_top,
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn overlay(&self) -> (Option<Vec<String>>, Option<String>) {
        if self.edit_form.active {
            let title = if self.edit_form.creating {
                "New password"
            } else {
                "Edit password"
            };
            (build_edit_overlay(&self.edit_form), Some(title.to_string()))
        } else if let Some(prompt) = &self.prompt {
            let (lines, title) = build_prompt_overlay(prompt);
            (Some(lines), Some(title.to_string()))
        } else if self.config_form.active {
            (
                build_config_overlay(&self.config_form),
                Some("Configuration".to_string()),
            )
        } else {
            (None, None)
        }
    }

    pub fn view(&self) -> ViewState<'_> {
        let (overlay, overlay_title) = self.overlay();
        let status_strength = if self.edit_form.active {
            Some(classify_password_strength(&self.edit_form.secret.password))
        } else {
            None
        };
        ViewState {
            tree: &self.tree,
            rows: &self.rows,
            selected: self.selected,
            expanded: &self.expanded,
            filter: self.filter.pattern(),
            filter_focused: self.mode == Mode::Filter,
            match_count: self.visibility.count().saturating_sub(1),
            content: &self.content,
            reveal: self.reveal,
            splitter: self.settings.splitter_ratio(),
            overlay,
            overlay_title,
            delete_overlay: self.delete_message(),
            quit_overlay: self.quit_overlay,
            status: self.status.clone(),
            status_strength,
        }
    }
}

/// Whether the entry at `shown` is `target` itself, or lies below it when
/// `target` is a folder.
fn is_affected(shown: &str, target: &str, is_dir: bool) -> bool {
    if is_dir {
        shown
            .strip_prefix(target)
            .is_some_and(|rest| rest.starts_with('/'))
    } else {
        shown == target
    }
}

fn rebase(path: &str, from: &str, to: &str, is_dir: bool) -> Option<String> {
    if !is_dir {
        return (path == from).then(|| to.to_string());
    }
    path.strip_prefix(from)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|rest| format!("{to}/{rest}"))
}

fn build_edit_overlay(form: &EditForm) -> Option<Vec<String>> {
    if !form.active {
        return None;
    }
    let password_display = if form.show_password {
        form.secret.password.clone()
    } else {
        "*".repeat(form.secret.password.chars().count())
    };
    let info_lines = form.secret.info.lines().count();
    let info_display = match form.secret.info.lines().next() {
        Some(first) if info_lines > 1 => format!("{first} (+{} lines)", info_lines - 1),
        Some(first) => first.to_string(),
        None => "(empty)".to_string(),
    };
    let steps = [
        ("Password", password_display),
        ("Characters", format!("< {} >", form.charset.label())),
        ("Length", form.length.to_string()),
        ("Information", info_display),
    ];
    let mut lines = vec![form.path.clone(), "".to_string()];
    for (idx, (label, val)) in steps.iter().enumerate() {
        let marker = if idx == form.step { ">" } else { " " };
        lines.push(format!("{marker} {label}: {val}"));
    }
    lines.push("".to_string());
    lines.push("Enter confirms; ↑/↓ move fields; Tab generates password; Ctrl+h show/hide".to_string());
    lines.push("←/→ change characters and length; e on Information opens $EDITOR".to_string());
    Some(lines)
}

fn build_prompt_overlay(prompt: &PathPrompt) -> (Vec<String>, &'static str) {
    match &prompt.kind {
        PromptKind::Create { folder } => (
            vec![
                format!("Folder: {folder}"),
                format!("> Name: {}", prompt.input),
                "".to_string(),
                "Enter confirms; Esc cancels".to_string(),
            ],
            "New entry",
        ),
        PromptKind::Rename { from } => (
            vec![
                format!("From: {from}"),
                format!("> To: {}", prompt.input),
                "".to_string(),
                "End with / to move into a folder; Esc cancels".to_string(),
            ],
            "Rename",
        ),
    }
}

fn build_config_overlay(form: &ConfigForm) -> Option<Vec<String>> {
    if !form.active {
        return None;
    }
    let check = |on: bool| if on { "[x]" } else { "[ ]" }.to_string();
    let draft = &form.draft;
    let rows = [
        ("Open entry when selected", check(draft.select_is_open)),
        ("Hide instead of quit", check(draft.close_is_hide)),
        ("Start hidden", check(draft.start_minimized)),
        ("Use tray icon", check(draft.use_tray_icon)),
        ("Always on top", check(draft.always_on_top)),
        ("Password length", format!("< {} >", draft.password_length)),
    ];
    let mut lines = Vec::new();
    for (idx, (label, val)) in rows.iter().enumerate() {
        let marker = if idx == form.step { ">" } else { " " };
        lines.push(format!("{marker} {val} {label}"));
    }
    lines.push("".to_string());
    lines.push("Space toggles; ←/→ length; Enter saves; Esc cancels".to_string());
    Some(lines)
}

/// Run `$EDITOR` on `text`; `None` when the editor exits unsuccessfully.
fn edit_text_with_editor(text: &str, terminal: &mut Tui) -> Result<Option<String>> {
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen, Show).ok();

    let mut file = NamedTempFile::new()?;
    file.write_all(text.as_bytes())?;
    file.flush()?;

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = Command::new(&editor)
        .arg(file.path())
        .status()
        .map_err(|e| anyhow!("Failed to launch editor '{editor}': {e}"));

    execute!(terminal.backend_mut(), EnterAlternateScreen, Hide).ok();
    enable_raw_mode().ok();
    terminal.clear()?;

    if !status?.success() {
        return Ok(None);
    }
    let edited = fs::read_to_string(file.path())?;
    file.as_file().set_len(0).ok();
    Ok(Some(edited))
}

fn teardown_terminal(terminal: &mut Tui) {
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen, Show).ok();
    terminal.show_cursor().ok();
}

pub fn run(store: &dyn PasswordStore, settings: Settings) -> Result<()> {
    if let Some((cols, rows)) = settings.terminal_size() {
        debug!(cols, rows, "previous terminal size");
    }

    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, Hide)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(store, settings);

    let result = (|| -> Result<()> {
        loop {
            app.tick();
            terminal.draw(|f| {
                if app.is_hidden() {
                    draw_hidden(f);
                } else {
                    draw(f, &app.view());
                }
            })?;

            if !event::poll(Duration::from_millis(200))? {
                continue;
            }
            let Event::Key(key_event) = event::read()? else {
                continue;
            };
            if key_event.kind != KeyEventKind::Press {
                continue;
            }
            match app.handle_key(key_event) {
                Action::Quit => break,
                Action::EditInfo => match edit_text_with_editor(app.editor_text(), &mut terminal) {
                    Ok(edited) => app.finish_info_edit(edited),
                    Err(e) => app.report(format!("Editor error: {e}")),
                },
                Action::Continue => {}
            }
        }
        Ok(())
    })();

    let size = terminal.size().ok().map(|area| (area.width, area.height));
    teardown_terminal(&mut terminal);
    app.close(size);
    info!("exiting");
    result
}
