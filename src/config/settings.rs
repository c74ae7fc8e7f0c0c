//! Settings module.

use super::parameters::ExposureParameters;

use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Settings {
    /// Seed of the random streams. A seed is drawn and logged when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub exposure: ExposureParameters,
}

#[derive(Debug)]
pub enum SettingsError {
    IoError(std::io::Error),
    YamlError(serde_yaml::Error),
}

impl std::error::Error for SettingsError {}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::IoError(error) => write!(formatter, "IO error: {}", error),
            SettingsError::YamlError(error) => write!(formatter, "YAML error: {}", error),
        }
    }
}

impl std::fmt::Display for Settings {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut output = vec![];
        self.write(&mut output).map_err(|_| std::fmt::Error)?;
        write!(
            formatter,
            "{}",
            String::from_utf8(output).map_err(|_| std::fmt::Error)?
        )
    }
}

impl Settings {
    pub fn write(&self, writer: &mut dyn std::io::Write) -> Result<(), SettingsError> {
        serde_yaml::to_writer(writer, self).map_err(SettingsError::YamlError)
    }

    pub fn read(reader: &mut dyn std::io::Read) -> Result<Settings, SettingsError> {
        serde_yaml::from_reader(reader).map_err(SettingsError::YamlError)
    }

    pub fn write_to_file(&self, filename: &str) -> Result<(), SettingsError> {
        let file = fs::File::create(filename).map_err(SettingsError::IoError)?;
        let mut writer = std::io::BufWriter::new(file);
        self.write(&mut writer)
    }

    pub fn read_from_file(filename: &str) -> Result<Settings, SettingsError> {
        let file = fs::File::open(filename).map_err(SettingsError::IoError)?;
        let mut reader = std::io::BufReader::new(file);
        Self::read(&mut reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::parameters::*;
    use serial_test::serial;

    fn advanced() -> Settings {
        Settings {
            seed: Some(8675309),
            exposure: ExposureParameters {
                baf: BafMode::Normal(NormalBaf {
                    mean: 18.5,
                    std_dev: 5.2,
                    floor: 1.,
                }),
                meal_size: MealSizeMode::Variable(LogLogisticParameters::default()),
                effluent: EffluentDistribution::HockeyStick {
                    percentile_break: 0.95,
                },
                dilution_response: DilutionResponse::HockeyStick {
                    threshold_dilution: 500.,
                    floor_concentration: 0.01,
                },
                sharing: ExposureSharing::PerPerson,
                discretize_dose: false,
                dose_response: DoseResponseParameters::default(),
                illness_given_infection: 0.6,
            },
        }
    }

    #[test]
    fn read_write() {
        let settings = advanced();
        let mut output = vec![];
        settings.write(&mut output).unwrap();
        let settings2 = Settings::read(&mut &output[..]).unwrap();
        assert_eq!(settings, settings2);
    }

    #[test]
    fn read_partial() {
        let yaml = b"seed: 42\nexposure:\n  baf: !Fixed 18.5\n";
        let settings = Settings::read(&mut &yaml[..]).unwrap();
        assert_eq!(settings.seed, Some(42));
        assert_eq!(settings.exposure.baf, BafMode::Fixed(18.5));
        assert_eq!(settings.exposure.meal_size, MealSizeMode::Fixed);
        assert_eq!(settings.exposure.illness_given_infection, 0.75);
    }

    #[test]
    fn read_variable_baf_modes() {
        let cases: [(&[u8], BafMode); 3] = [
            (
                b"exposure:\n  baf: !Uniform {low: 10.0, high: 30.0}\n",
                BafMode::Uniform(UniformBaf {
                    low: 10.,
                    high: 30.,
                }),
            ),
            (
                b"exposure:\n  baf: !Triangular\n    min: 5.0\n    mode: 15.0\n    max: 40.0\n",
                BafMode::Triangular(TriangularBaf {
                    min: 5.,
                    mode: 15.,
                    max: 40.,
                }),
            ),
            (
                b"exposure:\n  baf: !Normal {mean: 18.5, std_dev: 5.2, floor: 1.0}\n",
                BafMode::Normal(NormalBaf {
                    mean: 18.5,
                    std_dev: 5.2,
                    floor: 1.,
                }),
            ),
        ];
        for (yaml, expected) in cases {
            let settings = Settings::read(&mut &yaml[..]).unwrap();
            assert_eq!(settings.exposure.baf, expected);
            settings.exposure.validate().unwrap();
        }
    }

    #[test]
    fn read_variable_modes() {
        let yaml = b"\
exposure:
  meal_size: !Variable {shape: 0.96, scale: 76.37, min: 5.0, max: 800.0}
  effluent: !HockeyStick {percentile_break: 0.9}
  dilution_response: !HockeyStick {threshold_dilution: 500.0, floor_concentration: 0.01}
  sharing: PerPerson
";
        let settings = Settings::read(&mut &yaml[..]).unwrap();
        let exposure = settings.exposure;
        let MealSizeMode::Variable(meal) = exposure.meal_size else {
            panic!("expected a variable meal size, got {:?}", exposure.meal_size);
        };
        assert_eq!((meal.shape, meal.scale), (0.96, 76.37));
        assert_eq!((meal.min, meal.max), (Some(5.), Some(800.)));
        assert_eq!(meal.location, 0.);
        assert_eq!(
            exposure.effluent,
            EffluentDistribution::HockeyStick {
                percentile_break: 0.9
            }
        );
        assert_eq!(
            exposure.dilution_response,
            DilutionResponse::HockeyStick {
                threshold_dilution: 500.,
                floor_concentration: 0.01,
            }
        );
        assert_eq!(exposure.sharing, ExposureSharing::PerPerson);
    }

    #[test]
    fn read_empty_mapping() {
        let yaml = b"{}";
        let settings = Settings::read(&mut &yaml[..]).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    #[serial]
    fn read_write_file() {
        let tmp_dir = std::env::temp_dir().join("test_qmra_settings.yaml");
        let path = tmp_dir.to_str().unwrap();
        let settings = advanced();
        settings.write_to_file(path).unwrap();
        let read_settings = Settings::read_from_file(path).unwrap();
        assert_eq!(read_settings, settings);
        std::fs::remove_file(path).unwrap();
    }
}
