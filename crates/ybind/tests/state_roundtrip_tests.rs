use ybind::yrs::Any;
use ybind::{merge_updates, Document, KeyedMap, List, Text, EMPTY_UPDATE};

#[test]
fn full_state_updates_transfer_every_root() {
    let doc = Document::new();
    let list = doc.get_or_create_array("items").unwrap();
    list.push_back(true).unwrap();
    list.push_back(3.5).unwrap();
    list.push_back("three").unwrap();

    let map = doc.get_or_create_map("meta").unwrap();
    map.set("title", "hello world").unwrap();
    map.set("count", 2.0).unwrap();

    let text = doc.get_or_create_text("body").unwrap();
    text.push("abc").unwrap();
    text.insert(1, "xy").unwrap();

    let mirror = Document::new();
    mirror.apply_update(&doc.encode_state_as_update()).unwrap();

    assert_eq!(
        mirror.get_or_create_array("items").unwrap().to_json().unwrap(),
        Any::Array(
            vec![Any::Bool(true), Any::Number(3.5), Any::String("three".into())].into()
        )
    );
    let meta = mirror.get_or_create_map("meta").unwrap();
    assert_eq!(
        meta.get("title").unwrap().unwrap().to_json().unwrap(),
        Any::String("hello world".into())
    );
    assert_eq!(meta.len().unwrap(), 2);
    assert_eq!(
        mirror.get_or_create_text("body").unwrap().get_string().unwrap(),
        "axybc"
    );
    assert_eq!(doc.encode_state_vector(), mirror.encode_state_vector());
    assert_eq!(doc.snapshot(), mirror.snapshot());
}

#[test]
fn nested_containers_transfer_recursively() {
    let doc = Document::new();
    let root = doc.get_or_create_map("root").unwrap();
    let inner = List::new();
    inner.push_back(1.0).unwrap();
    let deeper = KeyedMap::new();
    deeper.set("leaf", "v").unwrap();
    inner.push_back(deeper).unwrap();
    root.set("inner", inner).unwrap();
    root.set("note", Text::from_string("n")).unwrap();

    let mirror = Document::new();
    mirror.apply_update(&doc.encode_state_as_update()).unwrap();
    assert_eq!(
        mirror.get_or_create_map("root").unwrap().to_json().unwrap(),
        doc.get_or_create_map("root").unwrap().to_json().unwrap()
    );
}

#[test]
fn deletions_survive_the_round_trip() {
    let doc = Document::new();
    let list = doc.get_or_create_array("items").unwrap();
    for n in 0..5 {
        list.push_back(f64::from(n)).unwrap();
    }
    list.remove(1, 3).unwrap();

    let mirror = Document::new();
    mirror.apply_update(&doc.encode_state_as_update()).unwrap();
    assert_eq!(
        mirror.get_or_create_array("items").unwrap().to_json().unwrap(),
        Any::Array(vec![Any::Number(0.0), Any::Number(4.0)].into())
    );
}

#[test]
fn merge_updates_collapses_a_log_into_one_update() {
    let doc = Document::new();
    let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = std::rc::Rc::clone(&log);
    doc.on_update(move |update, _| sink.borrow_mut().push(update.to_vec()));

    let list = doc.get_or_create_array("items").unwrap();
    list.push_back("a").unwrap();
    list.push_back("b").unwrap();
    list.remove(0, 1).unwrap();
    assert_eq!(log.borrow().len(), 3);

    let merged = merge_updates(&log.borrow()).unwrap();
    let mirror = Document::new();
    mirror.apply_update(&merged).unwrap();
    assert_eq!(
        mirror.get_or_create_array("items").unwrap().to_json().unwrap(),
        Any::Array(vec![Any::String("b".into())].into())
    );
}

#[test]
fn merging_nothing_yields_the_empty_update() {
    assert_eq!(merge_updates(&[]).unwrap(), EMPTY_UPDATE.to_vec());
    let doc = Document::new();
    doc.apply_update(&EMPTY_UPDATE).unwrap();
    assert!(doc.keys().is_empty());
}

#[test]
fn empty_document_state_is_the_empty_update() {
    let doc = Document::new();
    assert_eq!(doc.encode_state_as_update(), EMPTY_UPDATE.to_vec());
}
