mod fixtures;

use fixtures::{
    badge_component, generate_random_whitespace, generate_random_whitespace_at_least_one,
    get_engine, page_component, tree_view_component,
};
use treelate::{
    Component, Cond, Context, Engine, ForLoop, Node, RenderOptions, Tree, TreelateError, Value,
    ValueGetter,
};

fn compact() -> RenderOptions {
    RenderOptions::new().indent(0)
}

fn render0(engine: &Engine, tree: &Tree, ctx: &Context) -> String {
    engine.render(tree, ctx, &compact()).unwrap()
}

#[test]
#[ntest::timeout(100)]
fn test_basic_interpolation() {
    let engine = get_engine();
    let tree = Tree::nodes([(Node::tag("p"), Tree::text("Hello [[ name ]]!"))]);

    let mut ctx = Context::new();
    ctx.insert("name", "World");

    assert_eq!(render0(&engine, &tree, &ctx), "<p>Hello World!</p>");
}

#[test]
#[ntest::timeout(100)]
fn test_attribute_interpolation() {
    let engine = get_engine();
    let tree = Tree::nodes([(
        Node::tag("a").attr("href", ValueGetter::text("{base}/docs").unwrap()),
        Tree::text("docs"),
    )]);

    let mut ctx = Context::new();
    ctx.insert("base", "https://example.org");

    assert_eq!(
        render0(&engine, &tree, &ctx),
        "<a href=\"https://example.org/docs\">docs</a>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_rendering_is_deterministic() {
    let mut engine = get_engine();
    engine.register(page_component()).unwrap();

    let tree = Tree::nodes([(
        Node::component("Page").attr("page_title", "Home"),
        Tree::nodes([(
            Node::slot_template("content"),
            Tree::nodes([(Node::tag("p"), Tree::text("Hi [[ user ]]"))]),
        )]),
    )]);

    let mut ctx = Context::new();
    ctx.insert("user", "ann");

    let options = RenderOptions::new().indent(2);
    let first = engine.render(&tree, &ctx, &options).unwrap();
    let second = engine.render(&tree, &ctx, &options).unwrap();
    assert_eq!(first, second, "same (template, context) must be byte-identical");
    assert!(first.contains("Hi ann"));
}

#[test]
#[ntest::timeout(100)]
fn test_if_elif_else_chain() {
    let engine = get_engine();
    let tree = Tree::nodes([
        (
            Node::tag("div").when(Cond::if_("first").unwrap()),
            Tree::text("first"),
        ),
        (
            Node::tag("div").when(Cond::elif("second").unwrap()),
            Tree::text("second"),
        ),
        (Node::tag("div").when(Cond::else_()), Tree::text("third")),
    ]);

    let mut ctx = Context::new();
    ctx.insert("first", false).insert("second", true);

    assert_eq!(render0(&engine, &tree, &ctx), "<div>second</div>");
}

#[test]
#[ntest::timeout(100)]
fn test_chain_exclusivity_for_all_truth_values() {
    let engine = get_engine();
    for (first, second) in [(false, false), (false, true), (true, false), (true, true)] {
        let tree = Tree::nodes([
            (
                Node::tag("div").when(Cond::if_("first").unwrap()),
                Tree::text("first"),
            ),
            (
                Node::tag("div").when(Cond::elif("second").unwrap()),
                Tree::text("second"),
            ),
            (Node::tag("div").when(Cond::else_()), Tree::text("third")),
        ]);

        let mut ctx = Context::new();
        ctx.insert("first", first).insert("second", second);

        let rendered = render0(&engine, &tree, &ctx);
        assert_eq!(
            rendered.matches("<div>").count(),
            1,
            "exactly one branch for first={} second={}",
            first,
            second
        );
        let expected = if first {
            "first"
        } else if second {
            "second"
        } else {
            "third"
        };
        assert_eq!(rendered, format!("<div>{}</div>", expected));
    }
}

#[test]
#[ntest::timeout(100)]
fn test_elif_outside_chain_is_fatal() {
    let engine = get_engine();
    let tree = Tree::nodes([(
        Node::tag("div"),
        Tree::nodes([(
            Node::tag("span").when(Cond::elif("true").unwrap()),
            Tree::Empty,
        )]),
    )]);

    let err = engine
        .render(&tree, &Context::new(), &compact())
        .unwrap_err();
    assert_eq!(err.offending_node(), Some("div"));
    match err {
        TreelateError::Render { source, .. } => {
            assert!(matches!(*source, TreelateError::Structure { .. }));
        }
        other => panic!("expected a Render wrapper, got {:?}", other),
    }
}

#[test]
#[ntest::timeout(100)]
fn test_for_loop_preserves_order() {
    let engine = get_engine();
    let tree = Tree::nodes([(
        Node::tag("ul"),
        Tree::nodes([(
            Node::tag("li").repeat(ForLoop::new("item in items").unwrap()),
            Tree::text("[[ item ]]"),
        )]),
    )]);

    let mut ctx = Context::new();
    ctx.insert("items", vec!["a", "b", "c"]);
    assert_eq!(
        render0(&engine, &tree, &ctx),
        "<ul><li>a</li><li>b</li><li>c</li></ul>"
    );

    let mut empty = Context::new();
    empty.insert("items", Value::List(vec![]));
    assert_eq!(render0(&engine, &tree, &empty), "<ul></ul>");
}

#[test]
#[ntest::timeout(100)]
fn test_for_loop_destructures_tuples() {
    let engine = get_engine();
    let tree = Tree::nodes([(
        Node::tag("li").repeat(ForLoop::new("name, score in pairs").unwrap()),
        Tree::text("[[ name ]]=[[ score ]]"),
    )]);

    let mut ctx = Context::new();
    ctx.insert(
        "pairs",
        Value::List(vec![
            Value::List(vec![Value::from("x"), Value::from(1)]),
            Value::List(vec![Value::from("y"), Value::from(2)]),
        ]),
    );

    assert_eq!(render0(&engine, &tree, &ctx), "<li>x=1</li><li>y=2</li>");
}

#[test]
#[ntest::timeout(100)]
fn test_slot_fallback_renders_default_content() {
    let mut engine = get_engine();
    engine.register(page_component()).unwrap();

    let tree = Tree::nodes([(Node::component("Page"), Tree::Empty)]);
    let rendered = render0(&engine, &tree, &Context::new());

    assert_eq!(
        rendered,
        "<html><head><title>Untitled</title></head><body>\
         <div>no nav yet</div>\
         <div>no content yet</div>\
         <div class=\"page-footer\">standard footer</div>\
         </body></html>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_slot_override_uses_caller_context() {
    let mut engine = get_engine();
    engine.register(page_component()).unwrap();

    let tree = Tree::nodes([(
        Node::component("Page"),
        Tree::nodes([(
            Node::slot_template("footer"),
            Tree::nodes([(Node::tag("p"), Tree::text("made by [[ user ]]"))]),
        )]),
    )]);

    let mut ctx = Context::new();
    ctx.insert("user", "ann");

    let rendered = render0(&engine, &tree, &ctx);
    assert!(rendered.contains("<p>made by ann</p>"));
    assert!(!rendered.contains("standard footer"));
    // Untouched slots keep their defaults.
    assert!(rendered.contains("<div>no nav yet</div>"));
}

#[test]
#[ntest::timeout(100)]
fn test_slot_template_inclusion_follows_caller_data() {
    let mut engine = get_engine();
    engine.register(page_component()).unwrap();

    let tree = Tree::nodes([(
        Node::component("Page"),
        Tree::nodes([(
            Node::slot_template("footer").when(Cond::if_("show_footer").unwrap()),
            Tree::nodes([(Node::tag("p"), Tree::text("custom footer"))]),
        )]),
    )]);

    let mut hidden = Context::new();
    hidden.insert("show_footer", false);
    assert!(render0(&engine, &tree, &hidden).contains("standard footer"));

    let mut shown = Context::new();
    shown.insert("show_footer", true);
    assert!(render0(&engine, &tree, &shown).contains("custom footer"));
}

#[test]
#[ntest::timeout(100)]
fn test_slot_props_injection() {
    let mut engine = get_engine();
    engine
        .register(Component::new(
            "Labeled",
            Tree::nodes([(
                Node::tag("div"),
                Tree::nodes([(
                    Node::slot("value").attr("hint", "from-slot"),
                    Tree::text("none"),
                )]),
            )]),
        ))
        .unwrap();

    let tree = Tree::nodes([(
        Node::component("Labeled"),
        Tree::nodes([(
            Node::slot_template("value").slot_props("sp"),
            Tree::text("[[ sp.hint ]]"),
        )]),
    )]);

    assert_eq!(
        render0(&engine, &tree, &Context::new()),
        "<div>from-slot</div>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_prop_caller_value_beats_declared_default() {
    let mut engine = get_engine();
    engine.register(badge_component()).unwrap();

    let with_value = Tree::nodes([(
        Node::component("Badge").attr("label", "caller"),
        Tree::Empty,
    )]);
    assert_eq!(
        render0(&engine, &with_value, &Context::new()),
        "<span class=\"badge\">caller</span>"
    );

    let without = Tree::nodes([(Node::component("Badge"), Tree::Empty)]);
    assert_eq!(
        render0(&engine, &without, &Context::new()),
        "<span class=\"badge\">unlabelled</span>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_prop_dynamic_assignment_beats_caller_value() {
    let mut engine = get_engine();
    engine.register(badge_component()).unwrap();

    let tree = Tree::nodes([(
        Node::component("Badge")
            .attr("label", "explicit")
            .bind(ValueGetter::expr("overrides").unwrap()),
        Tree::Empty,
    )]);

    let mut ctx = Context::new();
    ctx.insert("overrides", Value::from([("label", "bound")]));

    // The consumed property leaves nothing to pass through to the span.
    assert_eq!(
        render0(&engine, &tree, &ctx),
        "<span class=\"badge\">bound</span>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_prop_selector_default_fills_unset_only() {
    let mut engine = get_engine();
    engine.register(badge_component()).unwrap();

    let unset = Tree::nodes([(
        Node::switch("badge").attr("label", "from-selector"),
        Tree::branches([(
            "badge",
            Tree::nodes([(Node::component("Badge"), Tree::Empty)]),
        )]),
    )]);
    assert_eq!(
        render0(&engine, &unset, &Context::new()),
        "<span class=\"badge\">from-selector</span>"
    );

    let explicit = Tree::nodes([(
        Node::switch("badge").attr("label", "from-selector"),
        Tree::branches([(
            "badge",
            Tree::nodes([(
                Node::component("Badge").attr("label", "explicit"),
                Tree::Empty,
            )]),
        )]),
    )]);
    assert_eq!(
        render0(&engine, &explicit, &Context::new()),
        "<span class=\"badge\">explicit</span>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_component_passes_leftover_attrs_to_single_root() {
    let mut engine = get_engine();
    engine.register(badge_component()).unwrap();

    let tree = Tree::nodes([(
        Node::component("Badge").attr("id", "b1").attr(
            "xClass",
            ValueGetter::map([("shiny", ValueGetter::value(true))]),
        ),
        Tree::Empty,
    )]);

    assert_eq!(
        render0(&engine, &tree, &Context::new()),
        "<span id=\"b1\" class=\"badge shiny\">unlabelled</span>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_switch_selects_branch_and_passes_defaults() {
    let engine = get_engine();
    let tree = Tree::nodes([(
        Node::switch(ValueGetter::text("{kind}").unwrap()).attr(
            "Class",
            ValueGetter::map([("field", ValueGetter::value(true))]),
        ),
        Tree::branches([
            (
                "text",
                Tree::nodes([(
                    Node::void_tag("input").attr("type", "text"),
                    Tree::Empty,
                )]),
            ),
            (
                "select",
                Tree::nodes([(Node::tag("select"), Tree::Empty)]),
            ),
        ]),
    )]);

    let mut ctx = Context::new();
    ctx.insert("kind", "text");
    assert_eq!(
        render0(&engine, &tree, &ctx),
        "<input type=\"text\" class=\"field\"/>"
    );

    let mut other = Context::new();
    other.insert("kind", "unknown");
    assert_eq!(render0(&engine, &tree, &other), "");
}

#[test]
#[ntest::timeout(100)]
fn test_recursive_component_matches_input_depth() {
    let mut engine = get_engine();
    engine.register(tree_view_component()).unwrap();

    let leaf = Value::from([
        ("name", Value::from("leaf")),
        ("children", Value::List(vec![])),
    ]);
    let child = Value::from([
        ("name", Value::from("child")),
        ("children", Value::List(vec![leaf])),
    ]);
    let root = Value::from([
        ("name", Value::from("root")),
        ("children", Value::List(vec![child])),
    ]);

    let tree = Tree::nodes([(
        Node::component("TreeView").attr("node", ValueGetter::expr("tree").unwrap()),
        Tree::Empty,
    )]);

    let mut ctx = Context::new();
    ctx.insert("tree", root);

    assert_eq!(
        render0(&engine, &tree, &ctx),
        "<div class=\"tree-node\"><span>root</span>\
         <div class=\"tree-node\"><span>child</span>\
         <div class=\"tree-node\"><span>leaf</span></div></div></div>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_error_carries_node_and_partial_output() {
    let engine = get_engine();
    let tree = Tree::nodes([
        (Node::tag("div"), Tree::text("ok")),
        (Node::tag("span"), Tree::text("[[ missing ]]")),
    ]);

    let err = engine
        .render(&tree, &Context::new(), &compact())
        .unwrap_err();
    assert_eq!(err.offending_node(), Some("span"));
    assert_eq!(err.partial_output(), Some("<div>ok</div><span>"));
    match err {
        TreelateError::Render { source, .. } => {
            assert!(matches!(
                *source,
                TreelateError::MissingVariable { ref variable_name } if variable_name == "missing"
            ));
        }
        other => panic!("expected a Render wrapper, got {:?}", other),
    }
}

#[test]
#[ntest::timeout(100)]
fn test_debug_mode_shows_structural_markers() {
    let mut engine = get_engine();
    engine.register(page_component()).unwrap();

    let tree = Tree::nodes([(Node::component("Page"), Tree::Empty)]);

    let plain = engine
        .render(&tree, &Context::new(), &RenderOptions::new().indent(2))
        .unwrap();
    assert!(!plain.contains("<Page"));
    assert!(!plain.contains("<Slot"));

    let debug = engine
        .render(
            &tree,
            &Context::new(),
            &RenderOptions::new().indent(2).debug(true),
        )
        .unwrap();
    assert!(debug.contains("<Page"));
    assert!(debug.contains("</Page>"));
    assert!(debug.contains("<Slot"));
}

#[test]
#[ntest::timeout(100)]
fn test_doctype_prefixes_output() {
    let engine = get_engine();
    let tree = Tree::nodes([(Node::tag("html"), Tree::Empty)]);

    let rendered = engine
        .render(
            &tree,
            &Context::new(),
            &RenderOptions::new().indent(0).doctype("html"),
        )
        .unwrap();
    assert_eq!(rendered, "<!DOCTYPE html><html></html>");
}

#[test]
#[ntest::timeout(100)]
fn test_indent_width_controls_pretty_printing() {
    let engine = get_engine();
    let tree = Tree::nodes([(
        Node::tag("div"),
        Tree::nodes([(Node::tag("span"), Tree::text("hi"))]),
    )]);

    assert_eq!(
        engine
            .render(&tree, &Context::new(), &RenderOptions::new().indent(2))
            .unwrap(),
        "<div>\n  <span>\n    hi\n  </span>\n</div>\n"
    );
    assert_eq!(
        render0(&engine, &tree, &Context::new()),
        "<div><span>hi</span></div>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_expression_whitespace_is_insignificant() {
    let engine = get_engine();
    let body = format!(
        "[[{}name{}]]",
        generate_random_whitespace(),
        generate_random_whitespace_at_least_one()
    );
    let tree = Tree::nodes([(Node::tag("p"), Tree::text(body))]);

    let mut ctx = Context::new();
    ctx.insert("name", "World");

    assert_eq!(render0(&engine, &tree, &ctx), "<p>World</p>");
}

#[test]
#[ntest::timeout(100)]
fn test_global_context_merges_at_lowest_precedence() {
    let mut globals = Context::new();
    globals.insert("site", "Example");
    let engine = Engine::with_globals(globals);

    let tree = Tree::nodes([(Node::tag("div"), Tree::text("[[ site ]]"))]);
    assert_eq!(render0(&engine, &tree, &Context::new()), "<div>Example</div>");

    let mut ctx = Context::new();
    ctx.insert("site", "Override");
    assert_eq!(render0(&engine, &tree, &ctx), "<div>Override</div>");
}

#[test]
#[ntest::timeout(100)]
fn test_component_scope_is_props_plus_globals() {
    let mut globals = Context::new();
    globals.insert("site", "Example");
    let mut engine = Engine::with_globals(globals);
    engine
        .register(Component::new(
            "Footer",
            Tree::nodes([(Node::tag("footer"), Tree::text("[[ site ]]"))]),
        ))
        .unwrap();
    engine
        .register(Component::new(
            "Leaky",
            Tree::nodes([(Node::tag("span"), Tree::text("[[ caller_secret ]]"))]),
        ))
        .unwrap();

    // Globals are visible inside component templates.
    let footer = Tree::nodes([(Node::component("Footer"), Tree::Empty)]);
    assert_eq!(
        render0(&engine, &footer, &Context::new()),
        "<footer>Example</footer>"
    );

    // The caller's render context is not.
    let leaky = Tree::nodes([(Node::component("Leaky"), Tree::Empty)]);
    let mut ctx = Context::new();
    ctx.insert("caller_secret", "hidden");
    let err = engine.render(&leaky, &ctx, &compact()).unwrap_err();
    match err {
        TreelateError::Render { source, .. } => {
            assert!(matches!(*source, TreelateError::MissingVariable { .. }));
        }
        other => panic!("expected a Render wrapper, got {:?}", other),
    }
}

#[test]
#[ntest::timeout(100)]
fn test_component_context_hook_extends_props() {
    fn add_id(ctx: &mut Context) {
        if !ctx.contains("id") {
            ctx.insert("id", "generated-0");
        }
    }

    let mut engine = get_engine();
    engine
        .register(
            Component::new(
                "Anchor",
                Tree::nodes([(
                    Node::tag("a").attr("id", ValueGetter::text("{id}").unwrap()),
                    Tree::Empty,
                )]),
            )
            .context_hook(add_id),
        )
        .unwrap();

    let tree = Tree::nodes([(Node::component("Anchor"), Tree::Empty)]);
    assert_eq!(
        render0(&engine, &tree, &Context::new()),
        "<a id=\"generated-0\"></a>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_duplicate_component_registration_fails() {
    let mut engine = get_engine();
    engine.register(badge_component()).unwrap();
    let err = engine.register(badge_component()).unwrap_err();
    assert!(matches!(
        err,
        TreelateError::ComponentExists { component_name } if component_name == "Badge"
    ));
}

#[test]
#[ntest::timeout(100)]
fn test_missing_component_is_reported() {
    let engine = get_engine();
    let tree = Tree::nodes([(Node::component("Nope"), Tree::Empty)]);
    let err = engine
        .render(&tree, &Context::new(), &compact())
        .unwrap_err();
    match err {
        TreelateError::Render { source, .. } => {
            assert!(matches!(
                *source,
                TreelateError::MissingComponent { ref component_name } if component_name == "Nope"
            ));
        }
        other => panic!("expected a Render wrapper, got {:?}", other),
    }
}

#[test]
#[ntest::timeout(100)]
fn test_dynamic_slot_name() {
    let mut engine = get_engine();
    engine
        .register(
            Component::new(
                "Chooser",
                Tree::nodes([(
                    Node::tag("div"),
                    Tree::nodes([(
                        Node::slot(ValueGetter::text("{which}").unwrap()),
                        Tree::text("fallback"),
                    )]),
                )]),
            )
            .prop("which", "default"),
        )
        .unwrap();

    let tree = Tree::nodes([(
        Node::component("Chooser").attr("which", "b"),
        Tree::nodes([(Node::slot_template("b"), Tree::text("chosen"))]),
    )]);
    assert_eq!(render0(&engine, &tree, &Context::new()), "<div>chosen</div>");

    let unmatched = Tree::nodes([(
        Node::component("Chooser").attr("which", "z"),
        Tree::nodes([(Node::slot_template("b"), Tree::text("chosen"))]),
    )]);
    assert_eq!(
        render0(&engine, &unmatched, &Context::new()),
        "<div>fallback</div>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_custom_text_delimiters() {
    let mut engine = get_engine();
    engine.set_delimiters("<<", ">>");

    let tree = Tree::nodes([(Node::tag("p"), Tree::text("Hello << name >>, [[ verbatim ]]"))]);

    let mut ctx = Context::new();
    ctx.insert("name", "World");

    assert_eq!(
        render0(&engine, &tree, &ctx),
        "<p>Hello World, [[ verbatim ]]</p>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_boolean_attributes_render_bare_or_vanish() {
    let engine = get_engine();
    let tree = Tree::nodes([(
        Node::tag("button")
            .attr("disabled", ValueGetter::expr("locked").unwrap())
            .attr("title", Value::Null),
        Tree::text("Go"),
    )]);

    let mut locked = Context::new();
    locked.insert("locked", true);
    assert_eq!(
        render0(&engine, &tree, &locked),
        "<button disabled>Go</button>"
    );

    let mut open = Context::new();
    open.insert("locked", false);
    assert_eq!(render0(&engine, &tree, &open), "<button>Go</button>");
}

#[test]
#[ntest::timeout(100)]
fn test_data_attributes_expand_and_drop_nulls() {
    let engine = get_engine();
    let tree = Tree::nodes([(
        Node::tag("div").attr(
            "Data",
            ValueGetter::map([
                ("role", ValueGetter::value("main")),
                ("absent", ValueGetter::value(Value::Null)),
            ]),
        ),
        Tree::Empty,
    )]);

    assert_eq!(
        render0(&engine, &tree, &Context::new()),
        "<div data-role=\"main\"></div>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_text_nodes_emit_only_their_body() {
    let engine = get_engine();
    let tree = Tree::nodes([(
        Node::tag("div"),
        Tree::nodes([
            (Node::text(), Tree::text("Created by ")),
            (
                Node::tag("a").attr("href", "https://example.org"),
                Tree::text("us"),
            ),
        ]),
    )]);

    assert_eq!(
        render0(&engine, &tree, &Context::new()),
        "<div>Created by <a href=\"https://example.org\">us</a></div>"
    );
}

#[test]
#[ntest::timeout(100)]
fn test_void_tags_ignore_bodies() {
    let engine = get_engine();
    let tree = Tree::nodes([(
        Node::tag("head"),
        Tree::nodes([(
            Node::void_tag("meta").attr("charset", ValueGetter::raw("utf-8")),
            Tree::text("never rendered"),
        )]),
    )]);

    assert_eq!(
        render0(&engine, &tree, &Context::new()),
        "<head><meta charset=\"utf-8\"/></head>"
    );
}
