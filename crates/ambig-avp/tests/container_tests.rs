//! Container behaviour over whole records: lookups by type and by text,
//! ambiguity reporting, and settling ambiguities.

use ambig_avp::{
    AddMode, AttValPair, AttributeClassifier, AvpContainer, Canonical, Classification,
    ContainerOptions, KeyFolding, TableClassifier,
};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Car {
    Make,
    Model,
    Style,
    Year,
    Other,
}

impl Canonical for Car {
    fn is_canonical(&self) -> bool {
        !matches!(self, Car::Other)
    }
}

impl fmt::Display for Car {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Car::Make => "MAKE",
            Car::Model => "MODEL",
            Car::Style => "STYLE",
            Car::Year => "YEAR",
            Car::Other => "OTHER",
        })
    }
}

#[derive(Debug)]
struct CarClassifier;

impl AttributeClassifier<Car> for CarClassifier {
    fn classify(&self, text: &str) -> Option<Classification<Car>> {
        match text.to_lowercase().as_str() {
            "make" => Some(Classification::single(Car::Make)),
            "model" => Some(Classification::single(Car::Model)),
            "style" => Some(Classification::single(Car::Style)),
            "year" => Some(Classification::single(Car::Year)),
            "type" => Classification::ranked([Car::Model, Car::Style]),
            "other" => Some(Classification::single(Car::Other)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Fam {
    Father,
    Child,
}

impl Canonical for Fam {
    fn is_canonical(&self) -> bool {
        true
    }
}

impl fmt::Display for Fam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Fam::Father => "FATHER",
            Fam::Child => "CHILD",
        })
    }
}

type Cars = AvpContainer<Car, String, &'static str>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn cars() -> Cars {
    init_tracing();
    AvpContainer::with_classifier(Arc::new(CarClassifier))
}

fn add_record<E: ambig_avp::CanonicalType>(
    container: &mut AvpContainer<E, String, &'static str>,
    record: &[(&str, &str)],
) {
    for (text, value) in record {
        container.add_text(text, value.to_string()).unwrap();
    }
}

fn text_value(container: &mut Cars, text: &str) -> Option<String> {
    container
        .get_text(text)
        .unwrap()
        .and_then(|avp| avp.value().cloned())
}

fn type_value(container: &mut Cars, att_type: Car) -> Option<String> {
    container
        .get(&att_type)
        .unwrap()
        .and_then(|avp| avp.value().cloned())
}

fn assert_by_type(container: &mut Cars, record: &[(&str, &str)], types: &[Car]) {
    let id = container.id();
    for ((_, value), att_type) in record.iter().zip(types) {
        let avp = container.get(att_type).unwrap().expect("present by type");
        assert_eq!(avp.value().map(String::as_str), Some(*value), "{att_type}");
        assert_eq!(avp.container(), Some(id));
    }
}

// ============================================================================
// Lookup
// ============================================================================

#[test]
fn empty_container_finds_nothing() {
    let mut cars = cars();
    assert!(cars.is_empty());
    assert_eq!(cars.len(), 0);
    assert!(cars.get(&Car::Make).unwrap().is_none());
    assert!(cars.get_text("make").unwrap().is_none());
    assert!(cars.get_text("").unwrap().is_none());
    assert!(!cars.has_ambiguity());
    assert_eq!(cars.to_string(), "[]");
}

#[test]
fn typed_pair_is_found_by_text() {
    let mut cars = cars();
    cars.add(AttValPair::canonical(Car::Make, "foo".to_string()))
        .unwrap();
    assert_eq!(text_value(&mut cars, "make").as_deref(), Some("foo"));
    assert_eq!(text_value(&mut cars, "MAKE").as_deref(), Some("foo"));
}

#[test]
fn round_trip_without_classifier() {
    init_tracing();
    let mut plain: Cars = AvpContainer::new();
    plain
        .add(AttValPair::canonical(Car::Year, "2010".to_string()))
        .unwrap();
    plain.add_text("colour", "red".to_string()).unwrap();
    plain.add_text("Make", "honda".to_string()).unwrap();

    assert_eq!(plain.len(), 3);
    assert_eq!(type_value(&mut plain, Car::Year).as_deref(), Some("2010"));
    assert_eq!(text_value(&mut plain, "COLOUR").as_deref(), Some("red"));
    // no classifier: the type's name is tried as free text
    assert_eq!(type_value(&mut plain, Car::Make).as_deref(), Some("honda"));
    assert!(plain.get(&Car::Model).unwrap().is_none());
}

#[test]
fn unambiguous_record_round_trips() {
    let mut cars = cars();
    let record = [
        ("make", "hyundai"),
        ("model", "sonata"),
        ("style", "sedan"),
        ("year", "2010"),
    ];
    add_record(&mut cars, &record);

    let id = cars.id();
    for (text, value) in &record {
        let avp = cars.get_text(text).unwrap().expect("present by text");
        assert_eq!(avp.value().map(String::as_str), Some(*value));
        assert_eq!(avp.container(), Some(id));
    }
    assert_by_type(&mut cars, &record, &[Car::Make, Car::Model, Car::Style, Car::Year]);
    assert!(!cars.has_ambiguity());
    assert_eq!(cars.len(), 4);
}

#[test]
fn repeated_records_leave_one_ambiguity() {
    let mut cars = cars();
    for year in ["2010", "2011", "2012"] {
        add_record(
            &mut cars,
            &[
                ("make", "hyundai"),
                ("model", "sonata"),
                ("style", "sedan"),
                ("year", year),
            ],
        );
    }

    assert!(cars.has_ambiguity());
    let ambiguities = cars.ambiguities();
    assert_eq!(ambiguities.len(), 1);
    let years = ambiguities[0];
    assert_eq!(years.att_type(), Some(&Car::Year));
    assert_eq!(years.ambiguity_count(), 3);
    // latest add takes precedence
    assert_eq!(years.value().map(String::as_str), Some("2012"));
    assert_eq!(years.members().len(), 3);

    let makes = cars.get(&Car::Make).unwrap().unwrap();
    assert_eq!(makes.members().len(), 3);
    assert!(!makes.is_ambiguous());
}

#[test]
fn canonical_lookup_matches_cached_text_lookup() {
    let mut cars = cars();
    add_record(
        &mut cars,
        &[("make", "hyundai"), ("model", "sonata"), ("type", "sedan")],
    );

    assert_eq!(type_value(&mut cars, Car::Model).as_deref(), Some("sonata"));
    assert_eq!(type_value(&mut cars, Car::Style).as_deref(), Some("sedan"));
    assert_eq!(
        text_value(&mut cars, "type"),
        type_value(&mut cars, Car::Model)
    );

    let type_chain = cars.get_text("type").unwrap().unwrap();
    let readings: Vec<(Option<Car>, String)> = type_chain
        .alternatives()
        .iter()
        .map(|avp| (avp.att_type().copied(), avp.value().cloned().unwrap()))
        .collect();
    assert_eq!(
        readings,
        vec![
            (Some(Car::Model), "sonata".to_string()),
            (Some(Car::Model), "sedan".to_string()),
            (Some(Car::Style), "sedan".to_string()),
        ]
    );
}

// ============================================================================
// Ambiguity
// ============================================================================

#[test]
fn classifier_ambiguity_is_reported_on_primary_type() {
    let mut cars = cars();
    cars.add_text("type", "sonata".to_string()).unwrap();

    assert!(cars.has_ambiguity());
    let ambiguities = cars.ambiguities();
    assert_eq!(ambiguities.len(), 1);
    assert_eq!(ambiguities[0].att_type(), Some(&Car::Model));
    assert_eq!(ambiguities[0].ambiguity_count(), 2);
    assert_eq!(ambiguities[0].precedence(), 0);

    let style = ambiguities[0].next_ambiguity().unwrap();
    assert_eq!(style.att_type(), Some(&Car::Style));
    assert_eq!(style.precedence(), 1);
    assert_eq!(style.first_ambiguity().id(), ambiguities[0].id());
    assert!(style.next_ambiguity().is_none());

    assert_eq!(type_value(&mut cars, Car::Style).as_deref(), Some("sonata"));
    assert_eq!(text_value(&mut cars, "type").as_deref(), Some("sonata"));
}

#[test]
fn resolve_then_discard_settles_record() {
    let mut cars = cars();
    let record = [
        ("make", "hyundai"),
        ("type", "sonata"),
        ("style", "sedan"),
        ("year", "2010"),
    ];
    add_record(&mut cars, &record);
    assert_by_type(&mut cars, &record, &[Car::Make, Car::Model, Car::Style, Car::Year]);

    let ambiguous: Vec<Option<Car>> = cars
        .ambiguities()
        .iter()
        .map(|avp| avp.att_type().copied())
        .collect();
    assert_eq!(ambiguous, vec![Some(Car::Model), Some(Car::Style)]);

    // STYLE holds [sedan, sonata-as-style]; keep sedan
    let sedan = cars
        .get(&Car::Style)
        .unwrap()
        .unwrap()
        .alternatives()
        .iter()
        .find(|avp| avp.value().map(String::as_str) == Some("sedan"))
        .map(|avp| avp.id())
        .unwrap();
    let resolved = cars.resolve(sedan).unwrap().unwrap();
    assert_eq!(cars.avp(resolved).unwrap().value().unwrap(), "sedan");
    assert_eq!(cars.ambiguities().len(), 1);

    // MODEL still carries the style reading of "type"; drop it
    let style_reading = cars.get(&Car::Model).unwrap().unwrap().alternatives()[1].id();
    cars.discard(style_reading).unwrap();

    assert!(!cars.has_ambiguity());
    assert_eq!(type_value(&mut cars, Car::Style).as_deref(), Some("sedan"));
    assert_eq!(type_value(&mut cars, Car::Model).as_deref(), Some("sonata"));
    assert_eq!(cars.len(), 4);
}

#[test]
fn discard_other_reading_leaves_model() {
    let mut cars = cars();
    add_record(
        &mut cars,
        &[
            ("make", "hyundai"),
            ("model", "sonata"),
            ("type", "sedan"),
            ("year", "2010"),
        ],
    );
    assert!(cars.has_ambiguity());

    let model = cars.ambiguities()[0];
    assert_eq!(model.att_type(), Some(&Car::Model));
    let wrong = model
        .alternatives()
        .iter()
        .find(|avp| avp.value().map(String::as_str) != Some("sonata"))
        .map(|avp| avp.id())
        .unwrap();

    let dropped = cars.discard(wrong).unwrap().unwrap();
    assert_eq!(dropped.att_type(), Some(&Car::Model));
    assert!(!cars.has_ambiguity());
    assert_eq!(type_value(&mut cars, Car::Model).as_deref(), Some("sonata"));
    assert_eq!(type_value(&mut cars, Car::Style).as_deref(), Some("sedan"));
}

#[test]
fn resolve_keeps_chosen_value_only() {
    let mut cars = cars();
    cars.add(AttValPair::canonical(Car::Style, "coupe".to_string()))
        .unwrap();
    let sedan = cars
        .add(AttValPair::canonical(Car::Style, "sedan".to_string()))
        .unwrap()[0];
    assert_eq!(cars.get(&Car::Style).unwrap().unwrap().ambiguity_count(), 2);

    let resolved = cars.resolve(sedan).unwrap().unwrap();
    let style = cars.get(&Car::Style).unwrap().unwrap();
    assert_eq!(style.id(), resolved);
    assert_eq!(style.value().unwrap(), "sedan");
    assert_eq!(style.ambiguity_count(), 1);
    assert!(!cars.has_ambiguity());

    // settled entries resolve to themselves
    assert_eq!(cars.resolve(resolved).unwrap(), Some(resolved));
    assert_eq!(cars.len(), 1);
}

#[test]
fn override_replaces_ambiguous_slot() {
    let mut cars = cars();
    for style in ["coupe", "sedan", "wagon"] {
        cars.add(AttValPair::canonical(Car::Style, style.to_string()))
            .unwrap();
    }
    assert_eq!(cars.get(&Car::Style).unwrap().unwrap().ambiguity_count(), 3);

    cars.override_with(AttValPair::canonical(Car::Style, "hatchback".to_string()))
        .unwrap();
    let style = cars.get(&Car::Style).unwrap().unwrap();
    assert_eq!(style.ambiguity_count(), 1);
    assert_eq!(style.value().unwrap(), "hatchback");
    assert_eq!(cars.len(), 1);
}

#[test]
fn explicit_alternatives_chain_in_order() {
    let mut cars = cars();
    let stored = cars
        .add_alternatives(
            vec![
                AttValPair::canonical(Car::Year, "2010".to_string()),
                AttValPair::canonical(Car::Year, "2011".to_string()),
            ],
            AddMode::Front,
        )
        .unwrap();
    assert_eq!(stored.len(), 2);
    let year = cars.get(&Car::Year).unwrap().unwrap();
    assert_eq!(year.value().unwrap(), "2010");
    assert_eq!(year.ambiguity_count(), 2);
    assert!(cars.add_alternatives(Vec::new(), AddMode::Next).unwrap().is_empty());
}

// ============================================================================
// Removal
// ============================================================================

#[test]
fn discarding_cached_reading_clears_every_route() {
    init_tracing();
    let classifier = TableClassifier::new()
        .with_entry("father", [Fam::Father])
        .with_entry("child", [Fam::Child])
        .with_entry("children", [Fam::Child]);
    let mut family: AvpContainer<Fam, String, &'static str> =
        AvpContainer::with_classifier(Arc::new(classifier));
    add_record(&mut family, &[("father", "tommy sr"), ("child", "tommy jr")]);

    for text in ["child", "children", "CHILD"] {
        let avp = family.get_text(text).unwrap().expect("child by text");
        assert_eq!(avp.value().unwrap(), "tommy jr");
    }
    assert_eq!(
        family.get(&Fam::Child).unwrap().unwrap().value().unwrap(),
        "tommy jr"
    );

    let child = family.get_text("child").unwrap().unwrap().id();
    family.discard(child).unwrap();

    assert_eq!(family.len(), 1);
    assert!(family.get(&Fam::Child).unwrap().is_none());
    assert!(family.get_text("child").unwrap().is_none());
    assert!(family.get_text("children").unwrap().is_none());
    assert!(family.get(&Fam::Father).unwrap().is_some());
}

#[test]
fn discarding_reading_found_by_text_matches_direct_discard() {
    let mut direct = cars();
    direct.add_text("type", "sonata".to_string()).unwrap();
    let style = direct.get(&Car::Model).unwrap().unwrap().alternatives()[1].id();
    direct.discard(style).unwrap();

    let mut by_text = cars();
    by_text.add_text("type", "sonata".to_string()).unwrap();
    let style = by_text.get_text("type").unwrap().unwrap().alternatives()[1].id();
    let dropped = by_text.discard(style).unwrap().unwrap();
    assert_eq!(dropped.att_type(), Some(&Car::Style));

    assert_eq!(by_text.to_string(), direct.to_string());
    assert_eq!(by_text.to_string(), "[MODEL=sonata]");
    assert!(!by_text.has_ambiguity());
    assert!(by_text.get(&Car::Style).unwrap().is_none());
    assert!(!by_text.get_text("type").unwrap().unwrap().is_ambiguous());
}

#[test]
fn remove_by_type_text_and_chain() {
    let mut cars = cars();
    add_record(
        &mut cars,
        &[
            ("make", "hyundai"),
            ("type", "sonata"),
            ("colour", "red"),
            ("year", "2010"),
        ],
    );
    assert_eq!(cars.len(), 5);

    assert!(cars.remove_text("Colour").unwrap());
    assert!(cars.get_text("colour").unwrap().is_none());

    assert!(cars.remove_type(&Car::Make).unwrap());
    assert!(!cars.remove_type(&Car::Make).unwrap());
    assert!(!cars.remove_type(&Car::Other).unwrap());
    assert!(cars.get_text("make").unwrap().is_none());

    let model = cars.get(&Car::Model).unwrap().unwrap().id();
    assert!(cars.remove_all(model).unwrap());
    assert!(cars.get(&Car::Model).unwrap().is_none());
    assert!(cars.get(&Car::Style).unwrap().is_none());
    assert!(cars.get_text("type").unwrap().is_none());
    assert_eq!(cars.len(), 1);

    assert!(cars.remove_text("year").unwrap());
    assert!(cars.is_empty());
}

#[test]
fn remove_matching_uses_pair_keys() {
    let mut cars = cars();
    cars.add_text("colour", "red".to_string()).unwrap();
    cars.add_text("colour", "blue".to_string()).unwrap();
    let colour = cars.get_text("colour").unwrap().unwrap();
    assert_eq!(colour.ambiguity_count(), 2);
    assert_eq!(colour.value().unwrap(), "red");

    assert!(cars
        .remove_matching(&AttValPair::free("COLOUR", "anything".to_string()))
        .unwrap());
    assert!(cars.is_empty());
}

// ============================================================================
// Metadata, rendering, options
// ============================================================================

#[test]
fn metadata_travels_with_pairs() {
    let mut cars = cars();
    cars.add(AttValPair::canonical(Car::Make, "honda".to_string()).with_metadata("row:1"))
        .unwrap();
    assert!(!cars.has_metadata());
    assert_eq!(cars.set_metadata("doc:7"), None);

    let make = cars.get(&Car::Make).unwrap().unwrap();
    assert_eq!(make.metadata(), Some(&"row:1"));
    assert_eq!(cars.metadata(), Some(&"doc:7"));
    assert_eq!(cars.to_string(), "[MAKE=honda+]+");
    assert_eq!(cars.take_metadata(), Some("doc:7"));
}

#[test]
fn adopt_marks_pair_without_storing() {
    let cars = cars();
    let mut pair = AttValPair::canonical(Car::Make, "honda".to_string());
    cars.adopt(&mut pair);
    assert_eq!(pair.container(), Some(cars.id()));
    assert!(cars.is_empty());
}

#[test]
fn options_control_key_folding() -> anyhow::Result<()> {
    let options: ContainerOptions =
        serde_json::from_str(r#"{ "key_folding": "ascii", "trim_keys": true }"#)?;
    assert_eq!(options.key_folding, KeyFolding::Ascii);

    let mut cars = cars().with_options(options.clone());
    cars.add_text("  Colour ", "red".to_string())?;
    assert_eq!(text_value(&mut cars, "colour").as_deref(), Some("red"));
    assert_eq!(cars.options(), &options);

    let json = serde_json::to_string(&ContainerOptions::default())?;
    assert_eq!(json, r#"{"key_folding":"unicode","trim_keys":false}"#);
    assert!(serde_json::from_str::<ContainerOptions>(r#"{ "fold": "x" }"#).is_err());
    assert_eq!(
        serde_json::from_str::<ContainerOptions>("{}")?,
        ContainerOptions::default()
    );
    Ok(())
}

#[test]
fn trimmed_keys_reach_the_classifier() {
    let options = ContainerOptions {
        trim_keys: true,
        ..ContainerOptions::default()
    };
    let mut cars = cars().with_options(options);
    cars.add_text(" type ", "sonata".to_string()).unwrap();

    assert!(cars.has_ambiguity());
    assert_eq!(type_value(&mut cars, Car::Model).as_deref(), Some("sonata"));
    assert_eq!(type_value(&mut cars, Car::Style).as_deref(), Some("sonata"));
    assert_eq!(text_value(&mut cars, "\tTYPE ").as_deref(), Some("sonata"));

    assert!(cars.remove_text(" type ").unwrap());
    assert!(cars.is_empty());
}

#[test]
fn remove_text_classifies_uncached_names() {
    let mut cars = cars();
    cars.add(AttValPair::canonical(Car::Model, "sonata".to_string()))
        .unwrap();
    cars.add(AttValPair::canonical(Car::Style, "sedan".to_string()))
        .unwrap();

    // typed adds are never cached under free text
    assert!(cars.remove_text("type").unwrap());
    assert!(cars.is_empty());
    assert!(!cars.remove_text("type").unwrap());
}
