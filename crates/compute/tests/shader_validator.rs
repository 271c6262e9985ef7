use std::fs;
use std::path::Path;

#[test]
fn validate_all_shaders() {
    let shader_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src/gpu/shaders");
    let mut errors = Vec::new();

    if !shader_dir.exists() {
        panic!("Shader directory not found: {:?}", shader_dir);
    }

    let mut count = 0;
    for entry in fs::read_dir(&shader_dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().map_or(false, |ext| ext == "wgsl") {
            let source = fs::read_to_string(&path).unwrap();
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            validate_shader(&name, &source, &mut errors);
            count += 1;
        }
    }
    assert_eq!(count, 3, "expected bitonic, reduce and vector_add shaders");

    if !errors.is_empty() {
        panic!("Shader validation failed:\n{}", errors.join("\n"));
    }
}

/// The sort kernel is compiled once per workgroup width; every width must validate.
#[test]
fn bitonic_specialisations_validate() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("src/gpu/shaders/bitonic.wgsl");
    let source = fs::read_to_string(path).unwrap();
    assert!(source.contains("const WORKGROUP_SIZE: u32 = 256u;"));
    assert!(source.contains("const LOCAL_SIZE: u32 = 512u;"));

    let mut errors = Vec::new();
    for log_width in 0..=10 {
        let width = 1u32 << log_width;
        let specialised = source
            .replace(
                "const WORKGROUP_SIZE: u32 = 256u;",
                &format!("const WORKGROUP_SIZE: u32 = {}u;", width),
            )
            .replace(
                "const LOCAL_SIZE: u32 = 512u;",
                &format!("const LOCAL_SIZE: u32 = {}u;", width * 2),
            );
        validate_shader(&format!("bitonic.wgsl (width {})", width), &specialised, &mut errors);
    }

    if !errors.is_empty() {
        panic!("Shader validation failed:\n{}", errors.join("\n"));
    }
}

#[test]
fn entry_points_match_host_names() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src/gpu/shaders");
    for (file, entry) in [
        ("bitonic.wgsl", "bitonic_sort"),
        ("vector_add.wgsl", "add_arrays"),
        ("reduce.wgsl", "reduce_sum"),
    ] {
        let source = fs::read_to_string(dir.join(file)).unwrap();
        let module = naga::front::wgsl::parse_str(&source).unwrap();
        assert!(
            module
                .entry_points
                .iter()
                .any(|ep| ep.name == entry && ep.stage == naga::ShaderStage::Compute),
            "{} has no compute entry point {}",
            file,
            entry
        );
    }
}

fn validate_shader(name: &str, source: &str, errors: &mut Vec<String>) {
    let module = match naga::front::wgsl::parse_str(source) {
        Ok(module) => module,
        Err(e) => {
            errors.push(format!("Failed to parse {}:\n{}", name, e.emit_to_string(source)));
            return;
        }
    };

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );

    if let Err(e) = validator.validate(&module) {
        errors.push(format!("Failed to validate {}:\n{:?}", name, e));
    }
}
