use std::cell::RefCell;
use std::rc::Rc;

use bindery_form::{
    Constraint, FormError, FormModel, Record, RecordAccessStrategy, RecordSchema, RulesValidator,
};
use bindery_value::{Value, ValueKind, ValueModelExt};

fn address_schema() -> Rc<RecordSchema> {
    Rc::new(
        RecordSchema::new("Address")
            .property("street", ValueKind::Text)
            .property("city", ValueKind::Text),
    )
}

fn person_schema() -> Rc<RecordSchema> {
    Rc::new(
        RecordSchema::new("Person")
            .property("name", ValueKind::Text)
            .property("address", ValueKind::Object),
    )
}

fn address(street: &str) -> Record {
    Record::new(address_schema())
        .with("street", street)
        .and_then(|r| r.with("city", "Springfield"))
        .unwrap()
}

fn person(name: &str, address: &Record) -> Record {
    Record::new(person_schema())
        .with("name", name)
        .and_then(|r| r.with("address", address.to_value()))
        .unwrap()
}

#[test]
fn child_dirty_makes_parent_dirty_and_commit_reaches_nested_record() {
    let home = address("Main St");
    let alice = person("Alice", &home);
    let parent = FormModel::for_record(&alice).unwrap();
    let child = parent
        .create_child_for_property("address", address_schema())
        .unwrap();
    assert!(child.parent().unwrap().ptr_eq(&parent));
    assert_eq!(
        child.value_model("street").unwrap().get(),
        Value::from("Main St")
    );

    child
        .value_model("street")
        .unwrap()
        .set("Elm St".into())
        .unwrap();
    assert!(child.is_dirty());
    assert!(parent.is_dirty());
    assert_eq!(home.get("street"), Value::from("Main St"));

    parent.commit().unwrap();
    assert_eq!(home.get("street"), Value::from("Elm St"));
    assert!(!child.is_dirty());
    assert!(!parent.is_dirty());
}

#[test]
fn revert_processes_children_first() {
    let alice = person("Alice", &address("Main St"));
    let parent = FormModel::for_record(&alice).unwrap();
    let child = parent
        .create_child_for_property("address", address_schema())
        .unwrap();

    let street = child.value_model("street").unwrap();
    let name = parent.value_model("name").unwrap();
    street.set("Elm St".into()).unwrap();
    name.set("Bob".into()).unwrap();

    let order = Rc::new(RefCell::new(Vec::new()));
    let o = Rc::clone(&order);
    let _s1 = street.on_change(move |_| o.borrow_mut().push("street"));
    let o = Rc::clone(&order);
    let _s2 = name.on_change(move |_| o.borrow_mut().push("name"));

    parent.revert();
    assert_eq!(*order.borrow(), ["street", "name"]);
    assert_eq!(street.get(), Value::from("Main St"));
    assert_eq!(name.get(), Value::from("Alice"));
    assert!(!parent.is_dirty());
}

#[test]
fn removing_the_only_dirty_child_clears_parent_dirty() {
    let home = address("Main St");
    let parent = FormModel::for_record(&home).unwrap();
    let child = FormModel::for_record(&address("Side St")).unwrap();

    child
        .value_model("city")
        .unwrap()
        .set("Shelbyville".into())
        .unwrap();
    parent.add_child(&child).unwrap();
    assert!(parent.is_dirty());

    parent.remove_child(&child).unwrap();
    assert!(!parent.is_dirty());
    assert!(child.is_dirty());
}

#[test]
fn child_errors_block_parent_commit() {
    let home = address("Main St");
    let parent = FormModel::for_record(&person("Alice", &home)).unwrap();
    let child = FormModel::builder(Rc::new(RecordAccessStrategy::new(&home)))
        .name("address")
        .all_fields()
        .validator(RulesValidator::new().rule("street", Constraint::Required))
        .build()
        .unwrap();
    parent.add_child(&child).unwrap();

    child.value_model("street").unwrap().set("".into()).unwrap();
    assert!(!child.is_committable());
    assert!(!parent.is_committable());
    assert!(parent.has_errors());
    assert_eq!(parent.validation_results().messages_for("street").len(), 1);
    assert!(matches!(
        parent.commit(),
        Err(FormError::NotCommittable { .. })
    ));

    parent.remove_child(&child).unwrap();
    assert!(parent.is_committable());
    assert!(!parent.has_errors());
}

#[test]
fn replacing_parent_object_reloads_nested_form() {
    let alice = person("Alice", &address("Main St"));
    let parent = FormModel::for_record(&alice).unwrap();
    let child = parent
        .create_child_for_property("address", address_schema())
        .unwrap();
    let street = child.value_model("street").unwrap();
    let name = parent.value_model("name").unwrap();
    street.set("Typo St".into()).unwrap();
    assert!(parent.is_dirty());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let (s, n, p) = (Rc::clone(&seen), Rc::clone(&name), parent.clone());
    let _sub = street.on_change(move |change| {
        s.borrow_mut()
            .push((change.new.clone(), n.get(), p.is_dirty()));
    });

    let bob = person("Bob", &address("Oak Ave"));
    parent.set_form_object(Some(bob.to_value()));

    assert_eq!(
        *seen.borrow(),
        vec![(Value::from("Oak Ave"), Value::from("Bob"), false)]
    );
    assert_eq!(street.get(), Value::from("Oak Ave"));
    assert!(!child.is_dirty());
    assert!(!parent.is_dirty());

    street.set("Pine Rd".into()).unwrap();
    parent.commit().unwrap();
    let bob_address = Record::from_value(&bob.get("address")).unwrap();
    assert_eq!(bob_address.get("street"), Value::from("Pine Rd"));
}

#[test]
fn disabling_parent_disables_nested_fields() {
    let alice = person("Alice", &address("Main St"));
    let parent = FormModel::for_record(&alice).unwrap();
    let child = parent
        .create_child_for_property("address", address_schema())
        .unwrap();
    let street = child.field_metadata("street").unwrap();

    parent.set_enabled(false);
    assert!(!street.is_enabled());
    parent.remove_child(&child).unwrap();
    assert!(street.is_enabled());
}
