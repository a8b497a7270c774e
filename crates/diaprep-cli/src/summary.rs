use console::Style;
use diaprep_core::engine::EngineVariant;
use diaprep_core::pipeline::{RunParameters, RunReport};
use diaprep_core::trim::DuplicateReference;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    ok: Style,
    error: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            ok: Style::new().green().bold(),
            error: Style::new().red().bold(),
        }
    }
}

pub fn print_run_summary(params: &RunParameters) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("DIA Preprocessing"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(17)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Input"),
        s.path.apply_to(params.loc_data.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Trimmed"),
        s.path.apply_to(params.loc_trim.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(params.loc_output.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Pattern"),
        s.value.apply_to(&params.name_pattern)
    );
    println!();

    println!("  {}", s.header.apply_to("Registration"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Trim"),
        s.value.apply_to(format!("{:.0}%", params.trimfrac * 100.0))
    );
    match params.wcs_ref_image {
        Some(ref image) => println!(
            "    {:<12}{}",
            s.label.apply_to("Reference"),
            s.path.apply_to(image.display())
        ),
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("Reference"),
            s.method.apply_to(format!("auto (marker '{}')", params.astrometric_marker))
        ),
    }
    if params.duplicate_reference == DuplicateReference::ProcessTwice {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Duplicates"),
            s.disabled.apply_to("reference registered twice")
        );
    }
    println!();

    let variant = EngineVariant::from_gpu_flag(params.use_gpu);
    let command = params.engine_commands.for_variant(variant);
    println!("  {}", s.header.apply_to("Subtraction"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Engine"),
        s.method.apply_to(format!("{} ({})", variant, command))
    );
    match params.ref_image_list {
        Some(ref list) => println!(
            "    {:<12}{}",
            s.label.apply_to("Ref list"),
            s.path.apply_to(list.display())
        ),
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("Ref list"),
            s.disabled.apply_to("none")
        ),
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Min refs"),
        s.value.apply_to(params.min_ref_images)
    );
    println!();
}

pub fn print_run_report(report: &RunReport) {
    let s = Styles::new();

    let state = if report.is_success() {
        s.ok.apply_to(report.state.to_string())
    } else {
        s.error.apply_to(report.state.to_string())
    };
    println!("  {:<14}{}", s.label.apply_to("State"), state);
    println!(
        "  {:<14}{}",
        s.label.apply_to("Elapsed"),
        s.value.apply_to(format!("{:.2} min", report.elapsed_minutes()))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("WCS ref"),
        s.path.apply_to(report.wcs_reference.display())
    );
    if let Some(ref trimmed) = report.trimmed {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Trimmed"),
            s.value.apply_to(format!("{} image(s)", trimmed.len()))
        );
    }
    if let Some(ref input) = report.subtraction_input {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Subtracted"),
            s.path.apply_to(input.display())
        );
    }
    if let Some(count) = report.diff_images {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Differences"),
            s.value.apply_to(format!("{} image(s)", count))
        );
    }
    if let Some(ref propagation) = report.propagation {
        let source = match propagation.source {
            Some(ref path) => path.display().to_string(),
            None => "no source".to_string(),
        };
        println!(
            "  {:<14}{} from {}",
            s.label.apply_to("WCS copied"),
            s.value.apply_to(format!("{} image(s)", propagation.updated.len())),
            s.path.apply_to(source)
        );
        for (path, reason) in &propagation.failures {
            println!(
                "    {} {}: {}",
                s.disabled.apply_to("skipped"),
                path.display(),
                reason
            );
        }
    }

    if !report.warnings.is_empty() {
        println!();
        println!("  {}", s.header.apply_to("Warnings"));
        for warning in &report.warnings {
            println!("    {}", s.disabled.apply_to(warning));
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("  {}", s.header.apply_to("Errors"));
        for error in &report.errors {
            println!(
                "    {} {} {}",
                s.error.apply_to(error.kind),
                s.label.apply_to(format!("[{}]", error.state)),
                error.message
            );
        }
    }
    for failure in &report.log_failures {
        println!("  {} {}", s.disabled.apply_to("run log:"), failure);
    }
    println!();
}
