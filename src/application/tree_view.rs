use canopy::{NamespaceStore, NodeId};
use colored::Colorize;

/// Renders the tree below the root, one node per line, children in their
/// stored order.
pub fn render_tree(store: &NamespaceStore, use_color: bool) -> String {
    let mut out = String::from("/\n");
    render_children(store, store.root(), "", use_color, &mut out);
    out
}

fn render_children(
    store: &NamespaceStore,
    parent: NodeId,
    prefix: &str,
    use_color: bool,
    out: &mut String,
) {
    let Some(node) = store.node(parent) else {
        return;
    };
    let children = node.children().collect::<Vec<_>>();
    for (i, child) in children.iter().enumerate() {
        let Some(entry) = store.node(*child) else {
            continue;
        };
        let last = i + 1 == children.len();
        let branch = if last { "└── " } else { "├── " };
        let label = if entry.is_directory() {
            let name = format!("{}/", entry.name());
            if use_color {
                name.bold().blue().to_string()
            } else {
                name
            }
        } else {
            format!("{} ({} B)", entry.name(), entry.size())
        };
        out.push_str(&format!("{prefix}{branch}{label}\n"));

        if entry.is_directory() {
            let nested = format!("{prefix}{}", if last { "    " } else { "│   " });
            render_children(store, *child, &nested, use_color, out);
        }
    }
}
