mod app;
mod cli;
mod color;
mod config;
mod dates;
mod db;
mod export;
mod filter;
mod schema;
mod status;
mod store;
mod timeline;
mod ui;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<(), app::AppError> {
    use app::{App, AppError, FindQuery};
    use clap::{CommandFactory, Parser};
    use cli::Commands;
    use filter::MatchStrength;
    use store::TypeDefinition;
    use ui::print_json;

    let cli = cli::Cli::parse();
    let registry = match cli.registry.as_deref() {
        Some(path) => config::Registry::from_file(path)?,
        None => config::Registry::builtin(),
    };

    if let Commands::Completions(args) = &cli.command {
        let mut command = cli::Cli::command();
        clap_complete::generate(args.shell, &mut command, "mile", &mut std::io::stdout());
        return Ok(());
    }
    if let Commands::Init = &cli.command {
        let created = App::init_project(&cli.root, &registry)?;
        for path in created {
            println!("initialized {}", path.display());
        }
        return Ok(());
    }

    let mut app = App::open(cli.root, registry, &cli.entity)?;

    match cli.command {
        Commands::New(args) => {
            let mut fields = vec![
                ("description".to_string(), args.description),
                ("value".to_string(), args.value),
            ];
            let optional = [
                ("status", args.status),
                ("owner", args.owner),
                ("dtype", args.dtype),
                ("other", args.other),
                ("notes", args.notes),
                ("commentary", args.commentary),
            ];
            for (key, value) in optional {
                if let Some(value) = value {
                    fields.push((key.to_string(), value));
                }
            }
            let view = app.create_record(&fields, args.by.as_deref())?;
            if args.json {
                print_json(&view);
            } else {
                println!("created {} (id {})", view.record.refname, view.record.id);
            }
        }
        Commands::Update(args) => {
            let changes = parse_field_pairs(&args.fields)?;
            if changes.is_empty() {
                return Err(AppError::InvalidArgument(
                    "update requires at least one --field key=value".to_string(),
                ));
            }
            let view = app.update_record(&args.name, &changes, &args.note, args.by.as_deref())?;
            if args.json {
                print_json(&view);
            } else {
                println!(
                    "updated {} (level {})",
                    view.record.refname,
                    view.record.updates.last().map(|event| event.level).unwrap_or(0)
                );
            }
        }
        Commands::Trace(args) => {
            let tracetype = args.tracetype.as_deref().unwrap_or(app.entity()).to_string();
            let view = app.add_trace(&args.name, &tracetype, &args.target, &args.note)?;
            if args.json {
                print_json(&view);
            } else {
                println!(
                    "traced {} -> {} ({})",
                    view.record.refname, args.target, tracetype
                );
            }
        }
        Commands::Ls(args) => {
            let filter = args.filter.to_filter();
            let time = parse_time_window(&args.time)?;
            let views = app.list(&filter, time.as_ref(), args.sort.as_deref());
            if args.json {
                print_json(&views);
            } else {
                ui::print_listing(&app.caption(), &views);
            }
        }
        Commands::Show(args) => {
            let view = app.show(&args.name)?;
            if args.json {
                print_json(&view);
            } else {
                ui::print_record(&view);
            }
        }
        Commands::Find(args) => {
            let strength = match args.strength.trim().to_lowercase().as_str() {
                "weak" => MatchStrength::Weak,
                "moderate" => MatchStrength::Moderate,
                "strong" => MatchStrength::Strong,
                "exact" => MatchStrength::VeryStrong,
                other => {
                    return Err(AppError::InvalidArgument(format!(
                        "unsupported match strength '{other}'; use weak|moderate|strong|exact"
                    )))
                }
            };
            let query = FindQuery {
                text: Some(args.query),
                field: args.field,
                strength,
            };
            let filter = args.filter.to_filter();
            let time = parse_time_window(&args.time)?;
            let views = app.find(&query, &filter, time.as_ref(), args.sort.as_deref());
            if args.json {
                print_json(&views);
            } else {
                ui::print_listing(&app.caption(), &views);
            }
        }
        Commands::Since(args) => {
            let since = dates::parse_date(&args.since).ok_or_else(|| {
                AppError::InvalidArgument(format!("'{}' is not a YY/MM/DD date", args.since))
            })?;
            let views = app.changed_since(since);
            if args.json {
                print_json(&views);
            } else {
                ui::print_listing(&format!("{} changed since {}", app.caption(), args.since), &views);
            }
        }
        Commands::Timeline(args) => {
            let filter = args.filter.to_filter();
            let chart = app.timeline(&filter, args.curve)?;
            if args.json {
                print_json(&chart);
            } else {
                ui::print_timeline(&app.caption(), &chart);
            }
        }
        Commands::Types(args) => {
            if let Some(name) = args.define {
                app.define_type(&TypeDefinition {
                    name: name.clone(),
                    description: args.describe,
                    start: args.start,
                    duration_months: args.months,
                })?;
                println!("defined type {name}");
            } else if args.json {
                print_json(&app.types());
            } else {
                for definition in app.types() {
                    let window = match dates::parse_date(&definition.start) {
                        Some(start) => {
                            let end = dates::add_months(start, definition.duration_months);
                            format!("{} to {}", definition.start, dates::format_date(end))
                        }
                        None => format!("start {}", definition.start),
                    };
                    println!(
                        "{:16.16} {} ({}, {} months)",
                        definition.name, definition.description, window, definition.duration_months
                    );
                    for (index, (open, close)) in definition.quarters().iter().enumerate() {
                        println!(
                            "    qtr {:2}: {} - {}",
                            index + 1,
                            dates::format_date(*open),
                            dates::format_date(*close)
                        );
                    }
                }
            }
        }
        Commands::Export(args) => {
            let filter = args.filter.to_filter();
            match args.format.trim().to_lowercase().as_str() {
                "csv" => print!("{}", app.export_csv(&filter)),
                "tex" => print!("{}", app.export_macros(&filter)),
                other => {
                    return Err(AppError::InvalidArgument(format!(
                        "unsupported export format '{other}'; use csv|tex"
                    )))
                }
            }
        }
        Commands::Init => unreachable!("init is handled before app initialization"),
        Commands::Completions(_) => {
            unreachable!("completions are handled before app initialization")
        }
    }

    Ok(())
}

fn parse_field_pairs(raw: &[String]) -> Result<Vec<(String, String)>, app::AppError> {
    raw.iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| {
                    app::AppError::InvalidArgument(format!(
                        "field change '{pair}' is not key=value"
                    ))
                })
        })
        .collect()
}

fn parse_time_window(
    args: &cli::TimeArgs,
) -> Result<Option<filter::TimeFilter>, app::AppError> {
    use filter::{TimeField, TimeFilter};

    if args.date_field.is_none() && args.after.is_none() && args.before.is_none() {
        return Ok(None);
    }
    let field = match args.date_field.as_deref() {
        None => TimeField::Scheduled,
        Some(raw) => TimeField::parse(raw).ok_or_else(|| {
            app::AppError::InvalidArgument(format!(
                "unsupported date field '{raw}'; use scheduled|updated|initialized"
            ))
        })?,
    };
    let parse_bound = |raw: &Option<String>| -> Result<Option<time::Date>, app::AppError> {
        match raw.as_deref() {
            None => Ok(None),
            Some(text) => dates::parse_date(text)
                .map(Some)
                .ok_or_else(|| {
                    app::AppError::InvalidArgument(format!("'{text}' is not a YY/MM/DD date"))
                }),
        }
    };
    Ok(Some(TimeFilter {
        field,
        low: parse_bound(&args.after)?,
        high: parse_bound(&args.before)?,
    }))
}
