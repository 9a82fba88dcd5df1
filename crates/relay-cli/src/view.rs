//! Client-side chat state.
//!
//! Everything here is local to the terminal: the admin's selected recipient,
//! the roster, and the last presence snapshot. The server never sees it.

use relay_core::{Identity, PrivateMessage, ServerEvent};
use std::collections::BTreeSet;

/// A line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// `/to <name>`: pick who the admin is writing to.
    Select(String),
    /// `/who`: print the roster.
    Who,
    /// `/quit`
    Quit,
    /// A command typed without its arguments; carries the usage line.
    Usage(&'static str),
    Text(String),
    Empty,
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Input::Empty;
        }
        if let Some(rest) = line.strip_prefix("/to ") {
            return Input::Select(rest.trim().to_string());
        }
        match line {
            "/to" => Input::Usage("/to <name>"),
            "/who" => Input::Who,
            "/quit" => Input::Quit,
            _ => Input::Text(line.to_string()),
        }
    }
}

/// What to do with a text line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Send(PrivateMessage),
    /// Admin typed a message with nobody selected.
    NeedRecipient,
}

/// One row of the admin's user list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    pub identity: Identity,
    pub online: bool,
    pub selected: bool,
}

pub struct ChatView {
    me: Identity,
    admin: Identity,
    roster: BTreeSet<Identity>,
    online: BTreeSet<Identity>,
    selected: Option<Identity>,
}

impl ChatView {
    pub fn new(me: Identity, admin: Identity) -> Self {
        Self {
            me,
            admin,
            roster: BTreeSet::new(),
            online: BTreeSet::new(),
            selected: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.me == self.admin
    }

    pub fn select(&mut self, identity: Identity) {
        self.selected = Some(identity);
    }

    /// Build the message for a typed line. Participants always write to the
    /// admin; the admin writes to the selected recipient.
    pub fn outgoing(&self, text: String) -> Outgoing {
        let to = if self.is_admin() {
            match &self.selected {
                Some(to) => to.clone(),
                None => return Outgoing::NeedRecipient,
            }
        } else {
            self.admin.clone()
        };
        Outgoing::Send(PrivateMessage {
            from: self.me.clone(),
            to,
            text,
        })
    }

    /// Fold a server event into the view and return the line to print.
    pub fn apply(&mut self, event: ServerEvent) -> Option<String> {
        match event {
            ServerEvent::PrivateMessage(m) => Some(format!("[{}] {}", m.from, m.text)),
            ServerEvent::PresenceUpdated { online } => {
                // Full replacement, never merged.
                self.online = online;
                Some(format!("* online: {}", join(&self.online)))
            }
            ServerEvent::Roster { identities } => {
                self.roster = identities;
                Some(format!("* {} registered users", self.roster.len()))
            }
            ServerEvent::Error { reason } => Some(format!("! {reason}")),
        }
    }

    /// Roster overlaid with presence: online users first, then by name.
    /// Users online but missing from the roster are listed too; the admin
    /// never is.
    pub fn rows(&self) -> Vec<RosterRow> {
        let mut rows: Vec<RosterRow> = self
            .roster
            .union(&self.online)
            .filter(|id| **id != self.admin)
            .map(|id| RosterRow {
                identity: id.clone(),
                online: self.online.contains(id),
                selected: self.selected.as_ref() == Some(id),
            })
            .collect();
        rows.sort_by(|a, b| b.online.cmp(&a.online).then_with(|| a.identity.cmp(&b.identity)));
        rows
    }
}

fn join(set: &BTreeSet<Identity>) -> String {
    if set.is_empty() {
        return "(nobody)".to_string();
    }
    set.iter().map(|i| i.as_str()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    fn set(names: &[&str]) -> BTreeSet<Identity> {
        names.iter().map(|n| id(n)).collect()
    }

    #[test]
    fn parse_inputs() {
        assert_eq!(Input::parse("  "), Input::Empty);
        assert_eq!(Input::parse("/to alice"), Input::Select("alice".into()));
        assert_eq!(Input::parse("/who"), Input::Who);
        assert_eq!(Input::parse("/quit"), Input::Quit);
        assert_eq!(Input::parse("hello there"), Input::Text("hello there".into()));
    }

    #[test]
    fn bare_to_is_not_sent_as_text() {
        assert_eq!(Input::parse("/to"), Input::Usage("/to <name>"));
        assert_eq!(Input::parse("  /to   "), Input::Usage("/to <name>"));
        assert_eq!(Input::parse("/to bob"), Input::Select("bob".into()));
        // Only the exact command word is special.
        assert_eq!(Input::parse("/tomorrow"), Input::Text("/tomorrow".into()));
    }

    #[test]
    fn participant_always_writes_to_admin() {
        let view = ChatView::new(id("alice"), id("vishal"));
        match view.outgoing("hi".into()) {
            Outgoing::Send(m) => {
                assert_eq!(m.from, id("alice"));
                assert_eq!(m.to, id("vishal"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn admin_needs_selection() {
        let mut view = ChatView::new(id("vishal"), id("vishal"));
        assert_eq!(view.outgoing("hi".into()), Outgoing::NeedRecipient);

        view.select(id("bob"));
        match view.outgoing("hi".into()) {
            Outgoing::Send(m) => assert_eq!(m.to, id("bob")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn presence_replaces_view() {
        let mut view = ChatView::new(id("vishal"), id("vishal"));
        view.apply(ServerEvent::PresenceUpdated { online: set(&["alice", "bob"]) });
        view.apply(ServerEvent::PresenceUpdated { online: set(&["bob"]) });
        let online: Vec<_> = view.rows().into_iter().filter(|r| r.online).collect();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].identity, id("bob"));
    }

    #[test]
    fn rows_online_first_then_alpha() {
        let mut view = ChatView::new(id("vishal"), id("vishal"));
        view.apply(ServerEvent::Roster {
            identities: set(&["dave", "carol", "bob", "alice", "vishal"]),
        });
        view.apply(ServerEvent::PresenceUpdated { online: set(&["dave", "bob"]) });
        view.select(id("carol"));

        let names: Vec<_> = view.rows().into_iter().map(|r| r.identity.to_string()).collect();
        assert_eq!(names, vec!["bob", "dave", "alice", "carol"]);
        assert!(view.rows().iter().any(|r| r.selected && r.identity == id("carol")));
    }

    #[test]
    fn online_outside_roster_is_listed() {
        let mut view = ChatView::new(id("vishal"), id("vishal"));
        view.apply(ServerEvent::Roster { identities: set(&["alice"]) });
        view.apply(ServerEvent::PresenceUpdated { online: set(&["zed"]) });
        assert_eq!(view.rows().len(), 2);
    }
}
