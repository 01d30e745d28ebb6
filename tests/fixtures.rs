use rand::Rng;
use treelate::{Component, Engine, ForLoop, Node, Tree, ValueGetter};

pub fn get_engine() -> Engine {
    Engine::new()
}

pub fn generate_random_whitespace() -> String {
    let mut rng = rand::rng();
    let length = rng.random_range(0..10);
    (0..length).map(|_| ' ').collect()
}

pub fn generate_random_whitespace_at_least_one() -> String {
    let mut rng = rand::rng();
    let length = rng.random_range(1..10);
    (0..length).map(|_| ' ').collect()
}

/// A page shell with three named slots and default content for each, in
/// the shape most component tests want.
pub fn page_component() -> Component {
    Component::new(
        "Page",
        Tree::nodes([(
            Node::tag("html"),
            Tree::nodes([
                (
                    Node::tag("head"),
                    Tree::nodes([(Node::tag("title"), Tree::text("[[ page_title ]]"))]),
                ),
                (
                    Node::tag("body"),
                    Tree::nodes([
                        (
                            Node::slot("nav"),
                            Tree::nodes([(Node::tag("div"), Tree::text("no nav yet"))]),
                        ),
                        (
                            Node::slot("content"),
                            Tree::nodes([(Node::tag("div"), Tree::text("no content yet"))]),
                        ),
                        (
                            Node::slot("footer"),
                            Tree::nodes([(
                                Node::tag("div")
                                    .attr("Class", ValueGetter::text("{footer_class}").unwrap()),
                                Tree::text("standard footer"),
                            )]),
                        ),
                    ]),
                ),
            ]),
        )]),
    )
    .prop("page_title", "Untitled")
    .prop("footer_class", "page-footer")
}

/// A small labelled badge; the component most precedence tests lean on.
pub fn badge_component() -> Component {
    Component::new(
        "Badge",
        Tree::nodes([(
            Node::tag("span").identity_class("badge"),
            Tree::text("[[ label ]]"),
        )]),
    )
    .prop("label", "unlabelled")
}

/// A self-referencing component rendering a nested map of
/// `{name, children}` entries.
pub fn tree_view_component() -> Component {
    Component::new(
        "TreeView",
        Tree::nodes([(
            Node::tag("div").identity_class("tree-node"),
            Tree::nodes([
                (Node::tag("span"), Tree::text("[[ node.name ]]")),
                (
                    Node::component("TreeView")
                        .repeat(ForLoop::new("child in node.children").unwrap())
                        .attr("node", ValueGetter::expr("child").unwrap()),
                    Tree::Empty,
                ),
            ]),
        )]),
    )
    .prop("node", ValueGetter::value(treelate::Value::Null))
}
