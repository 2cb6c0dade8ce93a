//! End-to-end tests: compile, register and evaluate scripts through the public API

#![allow(clippy::disallowed_methods)]

use std::cmp::Ordering;
use std::io::Write;
use voltage_script::{
    compile, evaluate, ChannelConfig, ChannelTable, EngineConfig, EvalContext, LogRecord, NoSolar,
    SamplePair, ScriptError, ScriptRegistry, SimulatedSolar, Unit, MAX_INTEGRATION_DEPTH,
};

const HOUR: i64 = 3600;

fn pair() -> (LogRecord, LogRecord) {
    // channel 0: voltage reference, channels 1-2: loads
    let old = LogRecord::new(10 * HOUR)
        .with_channel(0, 1000.0, 500.0)
        .with_channel(1, 100.0, 150.0)
        .with_channel(2, 50.0, 60.0);
    let new = LogRecord::new(11 * HOUR)
        .with_channel(0, 1240.0, 560.0)
        .with_channel(1, 220.0, 300.0)
        .with_channel(2, 80.0, 110.0);
    (old, new)
}

fn channels() -> ChannelTable {
    ChannelTable::new(vec![ChannelConfig::default(); 3])
}

#[test]
fn test_single_input_watts() {
    let registry = ScriptRegistry::new();
    let channels = channels();
    let ctx = EvalContext::new(&registry, &channels, &NoSolar);
    let script = compile(&registry, "load", "Watts", "I1").unwrap();

    let (old, new) = pair();
    assert_eq!(evaluate(&script, Some(&old), &new, Unit::Watts, &ctx), 120.0);
}

#[test]
fn test_grouping_and_constants() {
    let registry = ScriptRegistry::new();
    let channels = channels();
    let ctx = EvalContext::new(&registry, &channels, &NoSolar);
    let (old, new) = pair();

    let script = compile(&registry, "sum", "Watts", "(I1+I2)*C2.0").unwrap();
    assert_eq!(evaluate(&script, Some(&old), &new, Unit::Watts, &ctx), 300.0);

    // literal order does not matter to pool indexing
    let script = compile(&registry, "mix", "Watts", "C10-(I1*C0.5)+C3").unwrap();
    assert_eq!(evaluate(&script, Some(&old), &new, Unit::Watts, &ctx), 10.0 - 60.0 + 3.0);
}

#[test]
fn test_derived_unit_identities() {
    let registry = ScriptRegistry::new();
    let channels = channels();
    let ctx = EvalContext::new(&registry, &channels, &NoSolar);
    let (old, new) = pair();

    for formula in ["I1", "I1+I2", "(I1+I2)*C1.5", "I2|"] {
        let script = compile(&registry, "s", "Watts", formula).unwrap();
        let eval = |unit| evaluate(&script, Some(&old), &new, unit, &ctx);

        let va = eval(Unit::VA);
        let expected = (eval(Unit::VAR).powi(2) + eval(Unit::Watts).powi(2)).sqrt();
        assert!((va - expected).abs() < 1e-9, "{formula}: {va} vs {expected}");

        assert_eq!(eval(Unit::KWh), eval(Unit::Wh) / 1000.0);
    }
}

#[test]
fn test_volts_amps_hz() {
    let registry = ScriptRegistry::new();
    let channels = ChannelTable::new(vec![
        ChannelConfig::default(),
        ChannelConfig {
            vchannel: 0,
            vmult: 0.5,
        },
    ]);
    let ctx = EvalContext::new(&registry, &channels, &NoSolar);
    let (old, new) = pair();
    let script = compile(&registry, "s", "Amps", "I1").unwrap();

    assert_eq!(evaluate(&script, Some(&old), &new, Unit::Volts, &ctx), 120.0);
    assert_eq!(evaluate(&script, Some(&old), &new, Unit::Hz, &ctx), 60.0);
    assert_eq!(evaluate(&script, Some(&old), &new, Unit::Amps, &ctx), 150.0 / 120.0);
}

#[test]
fn test_results_always_finite() {
    let registry = ScriptRegistry::new();
    let channels = channels();
    let ctx = EvalContext::new(&registry, &channels, &NoSolar);
    let (old, new) = pair();
    // channel 7 is absent: zero deltas everywhere
    let formulas = ["I1/I7", "C1/C0", "I7", "(I1-I1)*C1e30*C1e30", "V3"];

    for formula in formulas {
        let script = compile(&registry, "s", "Watts", formula).unwrap();
        for unit in Unit::ALL {
            for old in [None, Some(&old)] {
                let value = evaluate(&script, old, &new, unit, &ctx);
                assert!(value.is_finite(), "{formula} in {unit}: {value}");
            }
        }
    }
}

#[test]
fn test_evaluation_is_pure() {
    let registry = ScriptRegistry::new();
    let channels = channels();
    let solar = SimulatedSolar::default();
    let ctx = EvalContext::new(&registry, &channels, &solar);
    let (old, new) = pair();
    let script = compile(&registry, "s", "Watts", "V0-I1").unwrap();

    for unit in Unit::ALL {
        let first = evaluate(&script, Some(&old), &new, unit, &ctx);
        let second = evaluate(&script, Some(&old), &new, unit, &ctx);
        assert_eq!(first.to_bits(), second.to_bits(), "{unit}");
    }
}

#[test]
fn test_forward_reference_rule() {
    let mut registry = ScriptRegistry::new();
    let err = compile(&registry, "total", "Watts", "Gmains+I2").unwrap_err();
    assert!(matches!(err, ScriptError::UnresolvedIntegration { ref name, .. } if name == "mains"));

    let mains = compile(&registry, "mains", "Watts", "I1").unwrap();
    registry.register(mains);
    let total = compile(&registry, "total", "Watts", "Gmains+I2").unwrap();

    let channels = channels();
    let ctx = EvalContext::new(&registry, &channels, &NoSolar);
    let (old, new) = pair();
    assert_eq!(evaluate(&total, Some(&old), &new, Unit::Watts, &ctx), 150.0);
}

#[test]
fn test_integration_chain_evaluates() {
    let mut registry = ScriptRegistry::new();
    registry.register(compile(&registry, "s0", "Watts", "I1").unwrap());
    for i in 1..MAX_INTEGRATION_DEPTH {
        let script = compile(&registry, &format!("s{i}"), "Watts", &format!("Gs{}", i - 1)).unwrap();
        registry.register(script);
    }
    let last = format!("Gs{}", MAX_INTEGRATION_DEPTH - 1);
    let out = compile(&registry, "out", "Watts", &last).unwrap();
    assert_eq!(out.integration_depth(), MAX_INTEGRATION_DEPTH);

    let channels = channels();
    let ctx = EvalContext::new(&registry, &channels, &NoSolar);
    let (old, new) = pair();
    assert_eq!(evaluate(&out, Some(&old), &new, Unit::Watts, &ctx), 120.0);
    assert_eq!(evaluate(&out, None, &new, Unit::Watts, &ctx), 220.0);

    // one more link cannot compile, so it cannot silently read 0
    registry.register(out);
    let err = compile(&registry, "beyond", "Watts", "Gout").unwrap_err();
    assert!(matches!(err, ScriptError::IntegrationTooDeep { depth, .. } if depth == MAX_INTEGRATION_DEPTH + 1));
}

#[test]
fn test_referenced_registry_keeps_order() {
    let empty = ScriptRegistry::new();
    let mut registry = ScriptRegistry::new();
    registry.register(compile(&empty, "a", "Watts", "I1").unwrap());
    registry.register(compile(&empty, "b", "Watts", "I2").unwrap());
    let out = compile(&registry, "out", "Watts", "Gb").unwrap();

    let err = registry.reorder(|x, y| y.name().cmp(x.name())).unwrap_err();
    assert!(matches!(err, ScriptError::RegistryReferenced { len: 2 }));

    let channels = channels();
    let ctx = EvalContext::new(&registry, &channels, &NoSolar);
    let (old, new) = pair();
    assert_eq!(evaluate(&out, Some(&old), &new, Unit::Watts, &ctx), 30.0);
}

#[test]
fn test_lookup_missing_name() {
    let mut registry = ScriptRegistry::new();
    assert!(registry.lookup("anything").is_none());

    let empty = ScriptRegistry::new();
    registry.register(compile(&empty, "mains", "Watts", "I0").unwrap());
    assert!(registry.lookup("main").is_none());
    assert!(registry.lookup("mains ").is_none());
    assert!(registry.lookup("mains").is_some());
}

#[test]
fn test_reorder_property() {
    let empty = ScriptRegistry::new();
    let mut registry = ScriptRegistry::new();
    for (name, unit) in [("d", "Wh"), ("a", "Volts"), ("c", "Watts"), ("b", "Wh"), ("a", "Amps")] {
        registry.register(compile(&empty, name, unit, "I0").unwrap());
    }

    let by_name = |a: &voltage_script::Script, b: &voltage_script::Script| a.name().cmp(b.name());
    registry.reorder(by_name).unwrap();

    let scripts: Vec<_> = registry.iter().collect();
    for window in scripts.windows(2) {
        assert_ne!(by_name(window[0], window[1]), Ordering::Greater);
    }
    // stable: equal names keep insertion order
    assert_eq!(scripts[0].unit(), Unit::Volts);
    assert_eq!(scripts[1].unit(), Unit::Amps);
}

#[test]
fn test_engine_from_file() {
    const YAML: &str = r#"
channels:
  - { vchannel: 0 }
  - { vchannel: 0 }
integrations:
  - { name: grid, units: Wh, script: "I1" }
  - { name: house, units: Wh, script: "Ggrid+I2" }
outputs:
  - { name: import, units: kWh, script: "G+grid" }
  - { name: export, units: Wh, script: "G-grid" }
  - { name: consumption, units: Watts, script: "Ghouse" }
"#;
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(YAML.as_bytes()).unwrap();
    let engine = EngineConfig::load_from_file(file.path())
        .unwrap()
        .build()
        .unwrap();

    let records = [
        LogRecord::new(0).with_channel(1, 0.0, 0.0).with_channel(2, 0.0, 0.0),
        LogRecord::new(HOUR).with_channel(1, 400.0, 0.0).with_channel(2, 100.0, 0.0),
        LogRecord::new(2 * HOUR).with_channel(1, 250.0, 0.0).with_channel(2, 150.0, 0.0),
    ];
    for interval in records.windows(2) {
        engine.record_interval(&interval[0], &interval[1]);
    }
    assert_eq!(engine.log(0).unwrap().len(), 3);

    let (old, new) = (Some(&records[0]), &records[2]);
    assert_eq!(engine.evaluate("import", old, new, None), Some(0.4));
    assert_eq!(engine.evaluate("export", old, new, None), Some(-150.0));
    // (250 + 150) Wh over two hours
    assert_eq!(engine.evaluate("consumption", old, new, None), Some(200.0));
    assert_eq!(engine.evaluate("nothing", old, new, None), None);
}

#[test]
fn test_instantaneous_split() {
    let config = EngineConfig::from_yaml_str(
        r#"
integrations:
  - { name: grid, script: "I1-I2" }
outputs:
  - { name: import, script: "G+grid" }
  - { name: export, script: "G-grid" }
"#,
    )
    .unwrap();
    let engine = config.build().unwrap();

    let pair = SamplePair::from_json(r#"{"new": {"unix_time": 0, "accum1": [0, 10, 40]}}"#).unwrap();
    assert_eq!(engine.evaluate("import", None, &pair.new, None), Some(0.0));
    assert_eq!(engine.evaluate("export", None, &pair.new, None), Some(-30.0));
}
